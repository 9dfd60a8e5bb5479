use clap::Parser;
use spplink_shared::{codec, link, ControlMessage};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(name = "linkctl", about = "Ask a running spplink to forget a peer")]
struct Cli {
    /// Display name of the peer(s) to disconnect and forget
    name: String,

    /// Control socket address
    #[arg(default_value = link::DEFAULT_CONTROL_ADDR)]
    control: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let frame = codec::encode(&ControlMessage::forget_peer(cli.name.as_str()))?;
    let mut socket = TcpStream::connect(&cli.control).await?;
    socket.write_all(&frame).await?;
    socket.shutdown().await?;

    println!("Sent forget request for '{}' to {}", cli.name, cli.control);
    Ok(())
}
