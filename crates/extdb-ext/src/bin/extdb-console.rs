//! Interactive console driver.
//!
//! Runs the extension against stdin with the same 80-byte output budget a
//! host buffer would impose, so paged results behave exactly as in-game.
//! Type `quit` to exit.

use std::io::{BufRead, Write};

use extdb_core::Extension;

const OUTPUT_BUDGET: usize = 80;

fn main() -> anyhow::Result<()> {
    let (extension, _log_guard) = Extension::start()?;

    println!("extdb console (output budget {} bytes), 'quit' to exit", OUTPUT_BUDGET);
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim_end_matches(['\r', '\n']);
        if input == "quit" {
            break;
        }
        println!("extdb: {}", extension.call(input, OUTPUT_BUDGET));
    }

    println!("extdb: quitting, please wait");
    extension.stop();
    Ok(())
}
