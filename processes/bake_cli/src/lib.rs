//! `bake_cli` — the client-side call wrapper shared by the `mkpool`,
//! `shutdown`, `copy-to` and `copy-from` front-ends (§6). Pool formatting
//! (`mkpool`) talks to a backend's on-disk layout directly; everything else
//! issues RPCs through the [`bake_backend::Fabric`] contract, the same
//! out-of-scope-transport abstraction `bake_provider`'s loopback fabric
//! stands in for (§1). Linking a real Mercury/libfabric-backed `Fabric`
//! implementation in place of the loopback one is what would let these
//! binaries reach a daemon running in another process.

pub mod client;

pub use client::BakeClient;
