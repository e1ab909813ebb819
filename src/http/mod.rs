//! HTTP/1.x message decoding and exchange reconstruction.

mod decoder;
mod reconstruct;

pub use decoder::{HttpEvent, MessageDecoder, Role};
pub use reconstruct::{Exchange, ExchangeSink, HttpReconstructor};
