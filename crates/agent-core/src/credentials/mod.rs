//! Provider & Credential Resolution
//!
//! The catalog lists the known OpenAI-compatible vendors; the resolver
//! picks one of them from explicit options and an environment snapshot.

pub mod catalog;
pub mod env;
pub mod resolver;

pub use catalog::{ProviderKind, ProviderProfile, DETECTION_ORDER, UNIVERSAL_DEFAULT_MODEL};
pub use env::EnvSnapshot;
pub use resolver::{
    infer_model_from_url, resolve, ClientSettings, CredentialResolver, LlmOptions,
    ResolvedCredentials,
};
