pub mod rfcomm;
pub mod tcp;
pub mod traits;

#[cfg(test)]
pub mod memory;

pub use rfcomm::{RfcommConfig, RfcommConnector, RfcommTransportStream, SPP_SERVICE_UUID};
pub use tcp::{TcpConnector, TcpTransportStream};
pub use traits::{BoxedStream, LinkProbe, OpenFlag, TransportConnector, TransportStream};
