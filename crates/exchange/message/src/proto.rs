// Automatically generated rust module for 'message.proto' file

#![allow(non_snake_case)]
#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(unused_imports)]
#![allow(unknown_lints)]
#![allow(clippy::all)]
#![allow(unreachable_pub)]
#![cfg_attr(rustfmt, rustfmt_skip)]

use quick_protobuf::{MessageRead, MessageWrite, BytesReader, Writer, WriterBackend, Result};
use quick_protobuf::sizeofs::*;

#[derive(Debug, Default, PartialEq, Clone)]
pub struct Message {
    pub type_pb: Option<mod_Message::MessageType>,
    pub id: Option<u64>,
    pub key: Option<String>,
    pub value: Option<Vec<u8>>,
    pub response: Option<bool>,
    pub success: Option<bool>,
    pub wantlist: Vec<String>,
}

impl<'a> MessageRead<'a> for Message {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(8) => msg.type_pb = Some(r.read_enum(bytes)?),
                Ok(16) => msg.id = Some(r.read_uint64(bytes)?),
                Ok(26) => msg.key = Some(r.read_string(bytes)?.to_owned()),
                Ok(34) => msg.value = Some(r.read_bytes(bytes)?.to_owned()),
                Ok(40) => msg.response = Some(r.read_bool(bytes)?),
                Ok(48) => msg.success = Some(r.read_bool(bytes)?),
                Ok(58) => msg.wantlist.push(r.read_string(bytes)?.to_owned()),
                Ok(t) => { r.read_unknown(bytes, t)?; }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl MessageWrite for Message {
    fn get_size(&self) -> usize {
        0
        + self.type_pb.as_ref().map_or(0, |m| 1 + sizeof_varint(*(m) as u64))
        + self.id.as_ref().map_or(0, |m| 1 + sizeof_varint(*(m) as u64))
        + self.key.as_ref().map_or(0, |m| 1 + sizeof_len((m).len()))
        + self.value.as_ref().map_or(0, |m| 1 + sizeof_len((m).len()))
        + self.response.as_ref().map_or(0, |m| 1 + sizeof_varint(*(m) as u64))
        + self.success.as_ref().map_or(0, |m| 1 + sizeof_varint(*(m) as u64))
        + self.wantlist.iter().map(|s| 1 + sizeof_len((s).len())).sum::<usize>()
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> Result<()> {
        if let Some(ref s) = self.type_pb { w.write_with_tag(8, |w| w.write_enum(*s as i32))?; }
        if let Some(ref s) = self.id { w.write_with_tag(16, |w| w.write_uint64(*s))?; }
        if let Some(ref s) = self.key { w.write_with_tag(26, |w| w.write_string(&**s))?; }
        if let Some(ref s) = self.value { w.write_with_tag(34, |w| w.write_bytes(&**s))?; }
        if let Some(ref s) = self.response { w.write_with_tag(40, |w| w.write_bool(*s))?; }
        if let Some(ref s) = self.success { w.write_with_tag(48, |w| w.write_bool(*s))?; }
        for s in &self.wantlist { w.write_with_tag(58, |w| w.write_string(&**s))?; }
        Ok(())
    }
}

pub mod mod_Message {

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MessageType {
    GET_BLOCK = 0,
    WANT_BLOCK = 1,
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::GET_BLOCK
    }
}

impl From<i32> for MessageType {
    fn from(i: i32) -> Self {
        match i {
            0 => MessageType::GET_BLOCK,
            1 => MessageType::WANT_BLOCK,
            _ => Self::default(),
        }
    }
}

impl<'a> From<&'a str> for MessageType {
    fn from(s: &'a str) -> Self {
        match s {
            "GET_BLOCK" => MessageType::GET_BLOCK,
            "WANT_BLOCK" => MessageType::WANT_BLOCK,
            _ => Self::default(),
        }
    }
}

}
