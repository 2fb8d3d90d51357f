//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use clap::Parser;
use std::process::ExitCode;
use telnetd_server::{Arguments, Daemon, DaemonConfig, Result, logging};
use tracing::{error, info};

fn main() -> ExitCode {
    // Load arguments from the command line and environment
    let arguments: Arguments = Parser::parse();

    let config = match DaemonConfig::try_from(arguments) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("telnetd: {err}");
            return ExitCode::from(2);
        }
    };

    if let Err(err) = logging::init(&config) {
        eprintln!("telnetd: {err}");
        return ExitCode::FAILURE;
    }

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(config: DaemonConfig) -> Result<()> {
    // Bind first so address errors still reach the terminal.
    let mut daemon = Daemon::new(config)?;
    if !daemon.config().foreground {
        info!("Detaching from terminal");
        nix::unistd::daemon(false, false)?;
    }
    daemon.run()
}
