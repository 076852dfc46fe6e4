// Copyright 2026 Proforma Contributors
// SPDX-License-Identifier: Apache-2.0

//! Proforma runtime library — offer collection from the SOCE
//! e-procurement portal.
//!
//! The sweep orchestrator ([`sweep`]) drives the rendering backend
//! ([`renderer`]) through one page per supplier, the extraction engine
//! ([`extract`]) turns each rendered page into normalized records, and
//! results land in the store ([`store`]) while progress streams through
//! [`events`] to any sink — the bundled SSE endpoint ([`rest`]), the
//! terminal, or a test collector.

pub mod cli;
pub mod docproxy;
pub mod error;
pub mod events;
pub mod extract;
pub mod portal;
pub mod renderer;
pub mod rest;
pub mod store;
pub mod sweep;
