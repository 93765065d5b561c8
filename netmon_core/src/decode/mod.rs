mod decode;
mod decode_context;
mod decode_transport;
mod error;

pub use decode::{
    decode_frame, decode_frame_with_length, PacketRecord, Protocol, ETHERNET_HEADER_LEN,
    ETHERTYPE_IPV4, ETHERTYPE_IPV6, IPV4_MIN_HEADER_LEN, IPV6_HEADER_LEN,
};
pub use decode_context::DecodeStats;
pub use decode_transport::{decode_ports, TransportPorts, TRANSPORT_MIN_LEN};
pub use error::{DecodeError, DecodeResult, HeaderLayer};
