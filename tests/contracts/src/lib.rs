//! Externally observable contracts of the ShopMe workspace.
//!
//! The actual scenarios live under `tests/`; this crate exists so they can
//! exercise `shopme-chat` and `shopme-node` together.
