pub mod engine;
pub mod keys;
pub mod pushdrop;
pub mod script;

// Re-export the main types for convenience
pub use engine::{ScriptService, UnlockVerifier, VerificationResult};
pub use keys::{DerivedKey, KeyDeriver};
pub use pushdrop::{PushDropEngine, PushDropScript, PushDropVerifier};
