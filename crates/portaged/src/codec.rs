//! Packet codec — adapts the core wire format to the TCP byte stream.

use bytes::BytesMut;
use portage_core::wire::{Packet, WireError};
use tokio_util::codec::{Decoder, Encoder};

pub struct PacketCodec;

fn invalid(error: WireError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, error)
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, Self::Error> {
        Packet::decode(src).map_err(invalid)
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}
