#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use rm86_cpu_core::{Console, Interp};
use rm86_mem::AddressSpace;

/// Byte delivered when input is closed or unreadable.
const EOF_BYTE: u8 = 0x1A;

#[derive(Debug, Parser)]
#[command(about = "Runs a 16-bit real-mode program image to completion")]
struct Args {
    /// Program image: a flat binary or an MZ executable.
    image: PathBuf,
}

/// Console over the host terminal. Raw mode is entered only for the duration
/// of a blocking read so panics and normal output keep a sane terminal.
struct TerminalConsole;

impl TerminalConsole {
    fn read_raw_byte(&mut self) -> u8 {
        if terminal::enable_raw_mode().is_err() {
            return EOF_BYTE;
        }
        let byte = loop {
            match event::read() {
                Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => {
                    if key.modifiers.contains(KeyModifiers::CONTROL) {
                        match key.code {
                            KeyCode::Char('c') | KeyCode::Char('d') | KeyCode::Char('z') => {
                                break EOF_BYTE
                            }
                            _ => continue,
                        }
                    }
                    match key.code {
                        KeyCode::Char(c) if c.is_ascii() => break c as u8,
                        KeyCode::Enter => break b'\r',
                        KeyCode::Tab => break b'\t',
                        KeyCode::Backspace => break 0x08,
                        KeyCode::Esc => break 0x1B,
                        _ => {}
                    }
                }
                Ok(_) => {}
                Err(_) => break EOF_BYTE,
            }
        };
        let _ = terminal::disable_raw_mode();
        byte
    }
}

impl Console for TerminalConsole {
    fn read_char(&mut self, echo: bool) -> u8 {
        let byte = self.read_raw_byte();
        if echo && byte != EOF_BYTE {
            self.write_char(byte);
        }
        byte
    }

    fn write_char(&mut self, byte: u8) {
        let mut out = io::stdout();
        let _ = out.write_all(&[byte]);
        let _ = out.flush();
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut mem = AddressSpace::new();
    let mut cpu = rm86_loader::load(&args.image, &mut mem)
        .with_context(|| format!("loading {}", args.image.display()))?;

    tracing::debug!(image = %args.image.display(), "image loaded, starting execution");
    let mut console = TerminalConsole;
    let exit = Interp::new(&mut cpu, &mut mem, &mut console).run();
    tracing::debug!(%exit, "execution finished");
    println!("Program exited: {exit}.");
    Ok(())
}
