//! TTS Adapter - 合成网关实现

mod fake_tts_client;
mod http_tts_client;

pub use fake_tts_client::{FakeGatewayConfig, FakeSynthesisGateway};
pub use http_tts_client::{HttpGatewayConfig, HttpSynthesisGateway};
