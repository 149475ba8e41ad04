pub mod safetensors;

pub use self::safetensors::SafetensorsSource;
