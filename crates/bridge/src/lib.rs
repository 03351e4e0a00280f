//! Request/response bridge letting untrusted page code ask a signing
//! authority for signatures over structured data, without ever holding keys.
//!
//! ```text
//!   PageShim ──request──► BroadcastChannel ──► Relay ──► Authority
//!      ▲                                          │
//!      └──────────result (same id)────────────────┘
//! ```

pub mod authority;
pub mod channel;
pub mod config;
pub mod correlation;
pub mod error;
pub mod host;
pub mod notification;
pub mod protocol;
pub mod readiness;
pub mod relay;
pub mod shim;

pub use authority::{
    Authority, Eip191Encoder, EthereumSecp256k1Signer, JsonEncoder, PayloadEncoder,
    PayloadSigner, RemoteAuthority, Secp256k1Signer, SignerAuthority, serve_authority,
};
pub use channel::{BroadcastChannel, Inbound, Subscription};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use host::{AlwaysMounted, Host, MountPoint, inject_on_load};
pub use notification::{Admission, NotificationMessage, NotificationQueue, NotificationState};
pub use readiness::{InjectionState, ReadinessCell, ReadinessMarker};
pub use relay::Relay;
pub use shim::{PageShim, RandomIds, RequestIdSource};
