// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod api_key;
pub mod config;
pub mod dogstatsd;
pub mod error;
pub mod file_logger;
pub mod gateway;
pub mod history;
pub mod http_utils;
pub mod intake;
pub mod models;
pub mod outcome;
pub mod server;
pub mod site;
