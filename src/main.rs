use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};

use clap::{error::ErrorKind, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use crossterm::tty::IsTty;
use tracing::{info, warn};

use keyerdrill::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    handshake::{handshake, HandshakeTiming},
    history,
    items::{build_pool, shuffle_pool, Category, WordList},
    link::SerialLink,
    logging::{init_logging, LogLevel},
    practice::{ExitReason, Practice, PracticeMode},
    protocol::{KeyerMode, PIN_CUSTOM, PIN_SPEAKER_OFF, PIN_SPEAKER_ON},
    runtime::{install_interrupt_handler, FixedTicker, StopFlag},
    session::{Session, StartOutcome},
    settings::Settings,
    terminal::{CrosstermKeySource, KeySource, TerminalGuard},
    ui::{summary_text, Screen, View},
};

/// practice sending and copying morse with a serial keyer
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Drill letters, numbers and words against a serial Morse keyer. The keyer's speed pot is tracked live during practice."
)]
pub struct Cli {
    /// config file to use instead of the default location
    #[clap(long)]
    config: Option<PathBuf>,

    /// serial port of the keyer (overrides the config file)
    #[clap(short = 'p', long)]
    port: Option<String>,

    #[clap(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// log file (default: ~/.local/state/keyerdrill/keyerdrill.log)
    #[clap(long)]
    log_file: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct ItemArgs {
    /// what to practice
    #[clap(value_enum)]
    category: Category,

    /// word length for the words category
    #[clap(short = 'n', long)]
    length: Option<usize>,

    /// word list file, one word per line (default: built-in list)
    #[clap(short = 'w', long)]
    wordlist: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// untimed practice
    Practice(ItemArgs),
    /// timed practice with a per-item limit
    Speed {
        /// seconds per item (0.1 to 5.0)
        #[clap(short = 's', long, value_parser = parse_time_limit)]
        seconds: Duration,

        #[clap(flatten)]
        items: ItemArgs,
    },
    /// change a keyer setting
    Set {
        #[clap(subcommand)]
        setting: SetCommand,
    },
    /// print the effective configuration
    Show,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SetCommand {
    Speed { wpm: u16 },
    Weighting { percent: u16 },
    Farnsworth { wpm: u16 },
    Ratio { ratio: u16 },
    Compensation { ms: u16 },
    LeadIn { ms: u16 },
    Tail { ms: u16 },
    Pins {
        #[clap(value_enum)]
        preset: PinPreset,
    },
    PotRange { min: u16, max: u16 },
    Mode {
        #[clap(value_enum)]
        mode: KeyerMode,
    },
    SpeedCommand {
        #[clap(value_enum)]
        kind: SpeedCommand,
    },
    /// toggle the sidetone speaker
    Speaker,
    ClearBuffer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum PinPreset {
    SpeakerOn,
    SpeakerOff,
    Custom,
}

impl PinPreset {
    fn byte(self) -> u8 {
        match self {
            PinPreset::SpeakerOn => PIN_SPEAKER_ON,
            PinPreset::SpeakerOff => PIN_SPEAKER_OFF,
            PinPreset::Custom => PIN_CUSTOM,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum SpeedCommand {
    Direct,
    Buffered,
}

fn parse_time_limit(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    if !(0.1..=5.0).contains(&secs) {
        return Err("time limit must be between 0.1 and 5.0 seconds".to_string());
    }
    Ok(Duration::from_secs_f64(secs))
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let mut config = store.load();

    if let Some(log_path) = cli.log_file.clone().or_else(AppDirs::log_path) {
        if let Err(e) = init_logging(cli.log_level, &log_path) {
            eprintln!("logging disabled: {e}");
        }
    }

    let port = cli.port.clone().unwrap_or_else(|| config.port.clone());

    match cli.command {
        Command::Practice(items) => run_practice(&store, &mut config, &port, &items, None),
        Command::Speed { seconds, items } => {
            run_practice(&store, &mut config, &port, &items, Some(seconds))
        }
        Command::Set { setting } => run_set(&store, &mut config, &port, setting),
        Command::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("config file: {}", store.path().display());
            Ok(())
        }
    }
}

fn run_practice(
    store: &FileConfigStore,
    config: &mut Config,
    port: &str,
    args: &ItemArgs,
    limit: Option<Duration>,
) -> Result<(), Box<dyn Error>> {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let wordlist = args
        .wordlist
        .as_deref()
        .map(WordList::from_file)
        .transpose()?;
    let mut pool = build_pool(args.category, wordlist.as_ref(), args.length)?;
    shuffle_pool(&mut pool, &mut rand::thread_rng());

    // Reject a bad pot range before touching the device.
    config.session.pot_range()?;

    let mut link = SerialLink::open(port)?;
    let device = handshake(&mut link, &config.session, &HandshakeTiming::default())?;
    info!(?device, category = %args.category, items = pool.len(), "starting practice");

    let stop = StopFlag::new();
    install_interrupt_handler(stop.clone())?;

    let mode = limit.map_or(PracticeMode::Untimed, PracticeMode::Timed);
    let ticker = FixedTicker::new(config.poll_interval());
    let pause = config.feedback_pause();

    let result = {
        let mut guard = TerminalGuard::enter()?;
        let mut keys = CrosstermKeySource::new(stop.clone());

        let mut session = Session::new(
            link,
            &mut keys,
            guard.terminal(),
            ticker,
            &mut config.session,
            stop.clone(),
        )?
        .with_feedback_pause(pause);

        if let Some(limit) = mode.limit() {
            match session.wait_for_start(limit, pool.len()) {
                StartOutcome::Begin => {}
                StartOutcome::LinkFailed(msg) => {
                    drop(session);
                    drop(guard);
                    return Err(format!("keyer link lost: {msg}").into());
                }
                StartOutcome::TerminalFailed(msg) => {
                    drop(session);
                    drop(guard);
                    return Err(format!("keyboard lost: {msg}").into());
                }
                StartOutcome::Aborted | StartOutcome::Interrupted => {
                    drop(session);
                    drop(guard);
                    println!("Speed practice aborted.");
                    store.save(config)?;
                    return Ok(());
                }
            }
        }

        let result = session.run(Practice::new(pool, mode));

        if !stop.is_stopped() {
            Screen::draw(
                guard.terminal(),
                &View::Results {
                    result: &result,
                    timed: mode.is_timed(),
                },
            )?;
            wait_for_any_key(&mut keys, &stop)?;
        }
        result
    };

    print!("{}", summary_text(&result));

    if config.history {
        if let Some(path) = AppDirs::history_path() {
            if let Err(e) = history::append(&path, mode, &result) {
                warn!("could not record history: {e}");
            }
        }
    }
    store.save(config)?;

    match result.exit {
        ExitReason::LinkFailed(msg) => Err(format!("keyer link lost: {msg}").into()),
        ExitReason::TerminalFailed(msg) => Err(format!("keyboard lost: {msg}").into()),
        _ => Ok(()),
    }
}

fn wait_for_any_key<K: KeySource>(keys: &mut K, stop: &StopFlag) -> io::Result<()> {
    while !stop.is_stopped() {
        if keys.poll_byte(Duration::from_millis(100))?.is_some() {
            break;
        }
    }
    Ok(())
}

fn run_set(
    store: &FileConfigStore,
    config: &mut Config,
    port: &str,
    setting: SetCommand,
) -> Result<(), Box<dyn Error>> {
    if let SetCommand::SpeedCommand { kind } = setting {
        config.session.use_buffered_speed_change = kind == SpeedCommand::Buffered;
        store.save(config)?;
        println!("Speed changes will use the {kind:?} command.");
        return Ok(());
    }

    let mut link = SerialLink::open(port)?;
    handshake(&mut link, &config.session, &HandshakeTiming::default())?;

    let mut settings = Settings::new(&mut link, &mut config.session);
    match setting {
        SetCommand::Speed { wpm } => settings.set_speed(wpm)?,
        SetCommand::Weighting { percent } => settings.set_weighting(percent)?,
        SetCommand::Farnsworth { wpm } => settings.set_farnsworth(wpm)?,
        SetCommand::Ratio { ratio } => settings.set_ratio(ratio)?,
        SetCommand::Compensation { ms } => settings.set_key_compensation(ms)?,
        SetCommand::LeadIn { ms } => settings.set_ptt_lead_in(ms)?,
        SetCommand::Tail { ms } => settings.set_ptt_tail(ms)?,
        SetCommand::Pins { preset } => settings.set_pin_config(preset.byte())?,
        SetCommand::PotRange { min, max } => settings.set_pot_range(min, max)?,
        SetCommand::Mode { mode } => settings.set_mode(mode)?,
        SetCommand::Speaker => {
            let on = settings.toggle_speaker()?;
            println!("Speaker {}.", if on { "on" } else { "off" });
        }
        SetCommand::ClearBuffer => settings.clear_buffer()?,
        SetCommand::SpeedCommand { .. } => {}
    }
    store.save(config)?;
    Ok(())
}
