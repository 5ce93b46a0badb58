// Core protocol components
mod config;
mod error;
mod expiry;
mod gate;
mod issuer;
mod record;
mod signer;
mod time_utils;

// Token encoding
pub mod codec;

// Storage backends
pub mod storage;

// Core component exports
pub use config::TokenConfig;
pub use error::QslError;
pub use gate::{ConfirmRequest, Confirmation, ConfirmationGate, TokenPreview};
pub use issuer::{BatchOutcome, TimeProviderFn, TokenGeneratorFn, TokenIssuer};
pub use signer::TokenSigner;

// Data model exports
pub use record::{
    Actor, ConfirmationEvent, ConfirmationSource, Identity, LogEntry, TokenRecord, TokenUsage,
};

// Storage exports
pub use storage::{MemoryStorage, StorageStats, TokenStorage};
