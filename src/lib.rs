//! Beegate: the wallet access gate. Pages ask, the user decides, keys never leave.
//!
//! # Architecture
//!
//! ```text
//! page                      background                         surface (popup | tab)
//! ─────                     ──────────                         ─────────────────────
//! Bridge ──PageEnvelope──►  Background ──submit──► RequestRegistry ◄──read── LifecycleController
//!   ▲                         │    ▲                     │                      │
//!   │                         │    └─SurfaceMessage──────┼──────────────────────┤
//!   │                         ├──open_surface──► SurfacePolicy ──► SurfaceHost  │
//!   └──────PageReply──────────┘                          │                      │
//!                                                   SharedStore ◄── WalletAccess┘
//! ```
//!
//! Contexts share nothing but the [`store::SharedStore`] and the message
//! channel. Every surface re-derives its screen from a fresh snapshot through
//! the same [`controller::LifecycleController`].
//!
//! # Request lifecycle
//!
//! | State | Entered by |
//! |-------|------------|
//! | Pending | `Background::handle_page` submits and opens the popup |
//! | Approved | surface approves, result forwarded to the page |
//! | Rejected | surface rejects, page promise rejects with `USER_REJECTED` |
//! | Abandoned | surface closes (or idles out) first, page rejects with `ABANDONED` |
//!
//! # Features
//!
//! - `native` - tokio background loop, file-backed store, log subscriber, CLI
//! - `wasm` - browser extension adapters (localStorage, BroadcastChannel, JS bindings)
//!
//! # Usage
//!
//! ```ignore
//! use beegate::{Background, Bridge, GateConfig, LifecycleController, MemoryStore, PopupSurface};
//!
//! let store = MemoryStore::new();
//! let background = Background::new(store.clone(), host.clone(), replies_tx, &GateConfig::from_env());
//! let bridge = Bridge::new("https://dapp.example", page_tx);
//!
//! // In the popup the background opened:
//! let controller = LifecycleController::new(store, PopupSurface::for_request(host, surface_id, request_id), results_tx);
//! let screen = controller.mount()?;
//! ```

// =============================================================================
// Shared modules (compile everywhere)
// =============================================================================
pub mod access;
pub mod background;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod core;
pub mod error;
pub mod message;
pub mod request;
pub mod store;
pub mod surface;

// =============================================================================
// Native-only modules
// =============================================================================
#[cfg(feature = "native")]
pub mod logging;
#[cfg(feature = "native")]
pub mod runtime;

// =============================================================================
// WASM-only modules
// =============================================================================
#[cfg(feature = "wasm")]
pub mod wasm;

// =============================================================================
// Re-exports
// =============================================================================
pub use access::{StoredWallet, Wallet, WalletAccess, WalletLockState};
pub use background::{Background, BackgroundEvent};
pub use bridge::{Bridge, ConnectOptions, ContractCallOptions, ListenerId};
pub use config::GateConfig;
pub use controller::{ContractExecutor, LifecycleController, Screen, Snapshot};
pub use error::{GateError, GateResult};
pub use message::{PageEnvelope, PageMessage, PageReply, ReplyOutcome, SurfaceMessage};
pub use request::{
    ConnectionRequest, ContractCallKind, ContractRequest, Param, PendingRequest, Permission, RequestKind,
    RequestOutcome, RequestPayload, RequestRegistry,
};
pub use store::{MemoryStore, SharedStore, StoreChange, StoreExt};
pub use surface::{PopupSurface, SurfaceAdapter, SurfaceHost, SurfaceKind, SurfacePolicy, SurfaceSpec, TabSurface};

#[cfg(feature = "native")]
pub use runtime::Shutdown;
#[cfg(feature = "native")]
pub use store::FileStore;
