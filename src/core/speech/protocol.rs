//! Wire messages exchanged with the cloud speech service.
//!
//! Frames on the wire are length-prefixed protobuf: `SpeechRequest` upstream,
//! `SpeechResponse` downstream. The messages are hand-derived with prost so
//! the crate builds without a protoc toolchain.

/// Request frame type discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ReqType {
    /// Full text query, no audio follows.
    Text = 0,
    /// Opens a voice stream; options travel on this frame.
    Start = 1,
    /// One audio chunk of an open voice stream.
    Voice = 2,
    /// Closes a voice stream.
    End = 3,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SpeechRequest {
    #[prost(int32, tag = "1")]
    pub id: i32,
    #[prost(enumeration = "ReqType", tag = "2")]
    pub req_type_raw: i32,
    /// Query text, populated for `Text` requests only.
    #[prost(string, tag = "3")]
    pub asr: String,
    /// Audio chunk, populated for `Voice` requests only.
    #[prost(bytes = "vec", tag = "4")]
    pub voice: Vec<u8>,
    #[prost(string, tag = "5")]
    pub lang: String,
    #[prost(string, tag = "6")]
    pub codec: String,
    #[prost(string, tag = "7")]
    pub vt: String,
    #[prost(string, tag = "8")]
    pub framework_options: String,
    #[prost(string, tag = "9")]
    pub skill_options: String,
}

impl SpeechRequest {
    pub fn req_type(&self) -> Option<ReqType> {
        ReqType::try_from(self.req_type_raw).ok()
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SpeechResponse {
    #[prost(int32, tag = "1")]
    pub id: i32,
    /// Server result code; 0 is success, see `SpeechError::from_server_code`.
    #[prost(uint32, tag = "2")]
    pub result: u32,
    /// True on the last frame of a result stream.
    #[prost(bool, tag = "3")]
    pub finish: bool,
    #[prost(string, tag = "4")]
    pub asr: String,
    #[prost(string, tag = "5")]
    pub nlp: String,
    #[prost(string, tag = "6")]
    pub action: String,
    /// Opaque server metadata (JSON), carries the activation verdict.
    #[prost(string, tag = "7")]
    pub extra: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn request_roundtrip_preserves_voice_payload() {
        let req = SpeechRequest {
            id: 7,
            req_type_raw: ReqType::Voice as i32,
            voice: vec![1, 2, 3, 4],
            ..Default::default()
        };
        let buf = req.encode_to_vec();
        let decoded = SpeechRequest::decode(buf.as_slice()).unwrap();
        assert_eq!(decoded, req);
        assert_eq!(decoded.req_type(), Some(ReqType::Voice));
    }
}
