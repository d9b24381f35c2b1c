//! Purpose: Library crate behind the `reclist` CLI and host integrations.
//! Exports: `api` (store, host trait, in-process host, row model, errors).
//! Role: Keeps a local, filterable, multi-selectable mirror of one host table in sync.
//! Invariants: `api` is the only public path; `core` stays internal.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
mod core;
