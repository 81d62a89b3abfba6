// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Shared-memory backing for flows.
//!
//! A flow's `data` file is a memory-mapped region with a fixed-size
//! [`layout::FlowInfoHeader`] page followed by the media body: a ring of
//! grain slots for discrete flows, or per-channel sample rings for
//! continuous flows. The layout types live in [`layout`]; the mapping and
//! typed access live in [`segment`].

pub(crate) mod layout;
pub(crate) mod segment;
