// Copyright 2025 Lablup Inc. and Jeongkyu Shin
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

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;

use crate::sink::SharedRegistry;

pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Serve the last published snapshot. Scrapes never trigger collection.
pub async fn metrics_handler(State(registry): State<SharedRegistry>) -> impl IntoResponse {
    let body = registry.read().await.body().to_string();
    ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body)
}

pub async fn healthz_handler(State(registry): State<SharedRegistry>) -> impl IntoResponse {
    if registry.read().await.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "no metrics published yet")
    }
}
