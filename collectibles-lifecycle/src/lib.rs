pub mod codec;
pub mod manager;
pub mod view;

// Re-export the main types for convenience
pub use codec::{CardCodec, DecodedCard};
pub use manager::{TokenLifecycleManager, MINT_MEMO, REDEEM_MEMO_PREFIX};
pub use view::CollectionView;
