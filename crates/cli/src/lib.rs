// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod classify;
pub mod config;
pub mod detector;
pub mod error;
pub mod event;
pub mod hub;
pub mod pty;
pub mod registry;
pub mod screenshot;
pub mod session;
pub mod test_support;
pub mod transport;
