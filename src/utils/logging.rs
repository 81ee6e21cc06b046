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

use tracing_subscriber::EnvFilter;

use crate::server::audit::ACCESS_LOG_TARGET;

/// Create an environment filter based on verbosity level.
///
/// Access records are always kept at info, so a quiet server still logs
/// every login and connection.
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directives = match verbosity {
            0 => "sshadm=warn",
            1 => "sshadm=info",
            // -vv: Include russh debug logs for SSH troubleshooting
            2 => "sshadm=debug,russh=debug",
            _ => "sshadm=trace,russh=trace",
        };
        let directives = if verbosity == 0 {
            format!("{directives},{ACCESS_LOG_TARGET}=info")
        } else {
            directives.to_string()
        };
        EnvFilter::new(directives)
    }
}

/// Initialize console logging.
pub fn init_logging(verbosity: u8) {
    let filter = create_env_filter(verbosity);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_create_env_filter() {
        std::env::remove_var("RUST_LOG");
        for verbosity in 0..4 {
            let _ = create_env_filter(verbosity);
        }
        assert!(create_env_filter(0).to_string().contains(ACCESS_LOG_TARGET));
    }
}
