//! Shared test fixtures: a hand-rolled message type and frame builders.

use bytes::Bytes;

/// A minimal message implementing both protobuf and JSON codecs, so tests
/// can exercise either encoding without generated code.
#[derive(Clone, PartialEq, Default)]
pub(crate) struct TestMessage {
    pub value: String,
}

impl std::fmt::Debug for TestMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestMessage")
            .field("value", &self.value)
            .finish()
    }
}

impl serde::Serialize for TestMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("TestMessage", 1)?;
        state.serialize_field("value", &self.value)?;
        state.end()
    }
}

impl<'de> serde::Deserialize<'de> for TestMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Helper {
            value: String,
        }
        let helper = Helper::deserialize(deserializer)?;
        Ok(TestMessage {
            value: helper.value,
        })
    }
}

impl prost::Message for TestMessage {
    fn encode_raw(&self, buf: &mut impl bytes::BufMut)
    where
        Self: Sized,
    {
        if !self.value.is_empty() {
            prost::encoding::string::encode(1, &self.value, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), prost::DecodeError>
    where
        Self: Sized,
    {
        if tag == 1 {
            prost::encoding::string::merge(wire_type, &mut self.value, buf, ctx)
        } else {
            prost::encoding::skip_field(wire_type, tag, buf, ctx)
        }
    }

    fn encoded_len(&self) -> usize {
        if self.value.is_empty() {
            0
        } else {
            prost::encoding::string::encoded_len(1, &self.value)
        }
    }

    fn clear(&mut self) {
        self.value.clear();
    }
}

/// Build a raw envelope with the given flags and payload.
pub(crate) fn make_frame(flags: u8, payload: &[u8]) -> Bytes {
    let mut frame = Vec::with_capacity(5 + payload.len());
    frame.push(flags);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Bytes::from(frame)
}

/// Concatenate frames into one body buffer.
pub(crate) fn concat_frames(frames: &[Bytes]) -> Bytes {
    let mut all = Vec::new();
    for frame in frames {
        all.extend_from_slice(frame);
    }
    Bytes::from(all)
}
