// Copyright 2025 s2s Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # s2s CLI
//!
//! Command-line interface for the s2s service directory.
//!
//! - `s2s directory`: serve a directory over HTTP, with optional snapshots
//! - `s2s sign`: print the registration token for a name and address
//! - `s2s register` / `s2s unregister`: act as a provider
//! - `s2s overview` / `s2s set-status`: administer a running directory
//!
//! The [`config`] module turns flags and environment variables into the
//! library configuration types.

pub mod config;
