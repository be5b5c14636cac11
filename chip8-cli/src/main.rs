//! Entrypoint for CLI
use std::{
    env,
    error::Error,
    fs,
    io::{self, BufRead, Write},
    sync::mpsc::Receiver,
    thread,
    time::Instant,
};

#[macro_use]
extern crate slog;
use chip8::{constants::*, prelude::*, IMPL_VERSION};
use chip8_session::{
    ChannelSink, InputEvent, JsonLinesSink, ManagerConf, Outbound, ParamChange, SessionId,
    VmManager,
};
use log::{error, info, warn};
use slog::Drain;

static USAGE: &str = r#"
usage: chip8 CMD [ARGS]

commands:
    run     Run the target ROM file headless, then print the display
    play    Host a live session from a session manager configuration

examples:
    chip8 run maze.ch8 1000
    chip8 play sessions.yaml
    chip8 play sessions.yaml pong --json

while playing, stdin takes one message per line:
    {"key": 5, "pressed": true}
    {"frameRate": 30, "cyclesPerFrame": 20}
    pause
    rom NAME
    stats
    quit
"#;

const DEFAULT_CYCLES: usize = 1000;

fn run_bytecode(filepath: impl AsRef<str>, cycles: usize) -> Chip8Result<()> {
    println!("Running Bytecode Interpreter");

    let bytecode = fs::read(filepath.as_ref())?;

    let mut vm = Chip8Vm::new(Chip8Conf::default());
    vm.read_rom(bytecode.as_slice())?;

    let start = Instant::now();
    let result = vm.cycle(cycles);
    let end = Instant::now();

    println!(
        "time taken: {}ms",
        end.duration_since(start).as_nanos() as f64 / 1000000.0
    ); // to millis
    println!("{}", vm.dump_display()?);

    result?;

    Ok(())
}

fn play(conf_path: &str, rom_name: Option<&str>, json: bool) -> Result<(), Box<dyn Error>> {
    let conf = ManagerConf::from_file(conf_path)?;
    let rom = match conf.resolve_rom(rom_name) {
        Some(descriptor) => descriptor.load()?,
        None => return Err(format!("no ROM named {rom_name:?} in {conf_path}").into()),
    };

    let manager = VmManager::new(conf);
    let sweeper = manager.spawn_sweeper()?;

    let id = if json {
        manager.start(&rom, JsonLinesSink::new(io::stdout()))?
    } else {
        let (sink, frames) = ChannelSink::new();
        thread::spawn(move || render_frames(frames));
        manager.start(&rom, sink)?
    };
    info!("playing as session {id}");

    for line in io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();

        match line {
            "" => {}
            "quit" => break,
            "pause" => match manager.toggle_pause(&id) {
                Ok(true) => info!("paused"),
                Ok(false) => info!("resumed"),
                Err(err) => error!("{err}"),
            },
            "stats" => eprintln!("{}", serde_json::to_string(&manager.stats())?),
            _ => match line.strip_prefix("rom ") {
                Some(name) => change_rom(&manager, &id, name.trim()),
                None => handle_message(&manager, &id, line),
            },
        }

        if !manager.contains(&id) {
            info!("session {id} ended");
            break;
        }
    }

    sweeper.shutdown();
    manager.shutdown();

    Ok(())
}

fn change_rom(manager: &VmManager, id: &SessionId, name: &str) {
    let descriptor = match manager.conf().rom(name) {
        Some(descriptor) => descriptor,
        None => {
            warn!("unknown ROM {name}, choose one of {:?}", manager.catalog());
            return;
        }
    };

    let result = descriptor
        .load()
        .and_then(|rom| manager.change_rom(id, &rom));
    match result {
        Ok(()) => info!("loaded {name}"),
        Err(err) => error!("{err}"),
    }
}

/// Key events carry a `key` field, everything else is a parameter change.
fn handle_message(manager: &VmManager, id: &SessionId, line: &str) {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            warn!("unreadable message: {err}");
            return;
        }
    };

    let result = if value.get("key").is_some() {
        serde_json::from_value::<InputEvent>(value)
            .map_err(|err| warn!("bad input event: {err}"))
            .map(|event| manager.record_input(id, event))
    } else {
        serde_json::from_value::<ParamChange>(value)
            .map_err(|err| warn!("bad parameter change: {err}"))
            .map(|change| manager.update_params(id, change))
    };

    if let Ok(Err(err)) = result {
        error!("{err}");
    }
}

fn render_frames(frames: Receiver<Outbound>) {
    let stdout = io::stdout();

    for message in frames {
        match message {
            Outbound::Frame { frame } => {
                let mut out = stdout.lock();
                // Cursor to top left, then redraw in place.
                let _ = write!(out, "\x1b[H");
                for row in frame.chunks(DISPLAY_WIDTH) {
                    let line: String = row
                        .iter()
                        .map(|px| if *px == 1 { '#' } else { '.' })
                        .collect();
                    let _ = writeln!(out, "{line}");
                }
                let _ = out.flush();
            }
            Outbound::Started { session_id } => {
                // Clear the screen for the new program.
                print!("\x1b[2J");
                info!("session {session_id} started");
            }
            Outbound::Error { error } => error!("{error}"),
        }
    }
}

/// Asynchronous terminal logging, so session threads never block on stderr.
fn init_session_logging() -> Result<slog_scope::GlobalLoggerGuard, Box<dyn Error>> {
    let decorator = slog_term::PlainDecorator::new(io::stderr());
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let logger = slog::Logger::root(drain, o!("version" => IMPL_VERSION));

    let scope_guard = slog_scope::set_global_logger(logger);
    slog_stdlog::init_with_level(log::Level::Info)?;

    Ok(scope_guard)
}

fn main() -> Result<(), Box<dyn Error>> {
    match parse_args() {
        Some(Cmd::Run { filepath, cycles }) => {
            simple_logger::SimpleLogger::new().env().init()?;
            run_bytecode(filepath, cycles)?
        }
        Some(Cmd::Play { conf, rom, json }) => {
            let _scope_guard = init_session_logging()?;
            if let Err(err) = play(&conf, rom.as_deref(), json) {
                error!("{err}");
                std::process::exit(1);
            }
        }
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            std::process::exit(64)
        }
    }

    Ok(())
}

fn parse_args() -> Option<Cmd> {
    let mut args = env::args().skip(1);
    match args.next() {
        Some(cmd) => {
            // don't format me T.T
            match cmd.as_str() {
                "run" => Some(Cmd::Run {
                    filepath: consume_arg(&mut args)?,
                    cycles: match args.next() {
                        Some(count) => count.parse().ok()?,
                        None => DEFAULT_CYCLES,
                    },
                }),
                "play" => {
                    let conf = consume_arg(&mut args)?;
                    let mut rom = None;
                    let mut json = false;
                    for arg in args {
                        if arg == "--json" {
                            json = true;
                        } else {
                            rom = Some(arg);
                        }
                    }
                    Some(Cmd::Play { conf, rom, json })
                }
                _ => None,
            }
        }
        None => None,
    }
}

/// Consumes the next argument, and prints the usage text if it doesn't exist.
fn consume_arg(args: &mut impl Iterator<Item = String>) -> Option<String> {
    args.next()
}

fn print_usage() {
    println!("Chip8 v{IMPL_VERSION}");
    println!("{USAGE}");
}

enum Cmd {
    /// Run file
    Run { filepath: String, cycles: usize },
    /// Host a session
    Play {
        conf: String,
        rom: Option<String>,
        json: bool,
    },
}
