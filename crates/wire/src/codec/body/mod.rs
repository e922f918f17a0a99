mod chunked_encoder;
mod length_encoder;
mod payload_encoder;

pub(crate) use payload_encoder::PayloadEncoder;
