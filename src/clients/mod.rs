pub mod translate_client;

pub use translate_client::TranslateClient;
