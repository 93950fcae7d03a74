// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::Parser;
use skybench_cli::SkybenchApp;

fn main() {
    // Enable ANSI support on Windows 10+. The output is still gated by
    // supports-color, so failure here just means no color.
    let _ = enable_ansi_support::enable_ansi_support();

    let app = SkybenchApp::parse();
    let output = app.init_output();

    match app.exec(output) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            error.display_to_stderr(&output.stderr_styles());
            std::process::exit(error.process_exit_code())
        }
    }
}
