use std::io::{self, Write};
use std::path::Path;

use clap::CommandFactory;
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};

use crate::cli::{Cli, CompletionShell};
use crate::error::CliError;

const BIN_NAME: &str = "tally";

pub fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let script = completion_script(shell);
    if let Some(path) = output_path {
        std::fs::write(path, &script)?;
        println!("Wrote {shell:?} completions to {}", path.display());
    } else {
        io::stdout().write_all(&script)?;
    }
    Ok(())
}

pub fn completion_script(shell: CompletionShell) -> Vec<u8> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();
    match shell {
        CompletionShell::Bash => render(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => render(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => render(shells::Fish, &mut command, &mut buffer),
    }
    buffer
}

fn render<G: Generator>(generator: G, command: &mut clap::Command, buffer: &mut Vec<u8>) {
    generate(generator, command, BIN_NAME, buffer);
}
