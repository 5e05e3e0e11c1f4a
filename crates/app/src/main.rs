use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use course_core::gate::{CourseNav, Viewer};
use course_core::model::{LessonId, LessonRef, LessonType, OptionId, QuestionId, QuizId, SectionId};
use remote::{
    HttpAuthority, HttpAuthorityConfig, InMemoryAuthority, ProgressSessionClient, QuizAttemptClient,
    QuizDefinition,
};
use services::{
    Clock, CompletionGate, MediaPositionSource, ProgressSessionManager, QuizAttemptEngine,
    SeekMonitor, SubmitOutcome, TrackerConfig,
};
use tokio::time::Instant;
use tracing_subscriber::{EnvFilter, fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidAnswer { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidAnswer { raw } => {
                write!(f, "invalid --answer value: {raw} (expected <question>=<option>)")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn parse_answer(raw: String) -> Result<(QuestionId, OptionId), ArgsError> {
    let parsed: Option<(QuestionId, OptionId)> = raw
        .split_once('=')
        .and_then(|(question, option)| Some((question.parse().ok()?, option.parse().ok()?)));
    parsed.ok_or(ArgsError::InvalidAnswer { raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- watch --lesson <id> [--duration <secs>] [--seek <secs>] [--timeout <secs>] [--demo]");
    eprintln!("  cargo run -p app -- read  --lesson <id> [--timeout <secs>] [--demo]");
    eprintln!("  cargo run -p app -- quiz  --lesson <id> --quiz <id> [--answer <q>=<o>]... [--demo]");
    eprintln!();
    eprintln!("Without --demo the authority is reached over HTTP.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LEARN_API_URL, LEARN_API_TOKEN");
    eprintln!("  LEARN_HEARTBEAT_SECS, LEARN_DWELL_SECS, LEARN_SEEK_TOLERANCE_SECS, LEARN_SEEK_WARNING_SECS");
    eprintln!("  RUST_LOG (default: info)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Watch,
    Read,
    Quiz,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "watch" => Some(Self::Watch),
            "read" => Some(Self::Read),
            "quiz" => Some(Self::Quiz),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    lesson_id: LessonId,
    quiz_id: Option<QuizId>,
    duration_seconds: u32,
    seek_seconds: Option<f64>,
    timeout: Duration,
    answers: Vec<(QuestionId, OptionId)>,
    demo: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut lesson_id = None;
        let mut quiz_id = None;
        let mut duration_seconds = 600;
        let mut seek_seconds = None;
        let mut timeout = Duration::from_secs(120);
        let mut answers = Vec::new();
        let mut demo = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--lesson" => {
                    lesson_id = Some(parse_number(require_value(args, "--lesson")?, "--lesson")?);
                }
                "--quiz" => {
                    quiz_id = Some(parse_number(require_value(args, "--quiz")?, "--quiz")?);
                }
                "--duration" => {
                    duration_seconds = parse_number(require_value(args, "--duration")?, "--duration")?;
                }
                "--seek" => {
                    seek_seconds = Some(parse_number(require_value(args, "--seek")?, "--seek")?);
                }
                "--timeout" => {
                    let secs: u64 = parse_number(require_value(args, "--timeout")?, "--timeout")?;
                    timeout = Duration::from_secs(secs);
                }
                "--answer" => answers.push(parse_answer(require_value(args, "--answer")?)?),
                "--demo" => demo = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            lesson_id: lesson_id.ok_or(ArgsError::MissingFlag { flag: "--lesson" })?,
            quiz_id,
            duration_seconds,
            seek_seconds,
            timeout,
            answers,
            demo,
        })
    }
}

/// Authority handles shared by the trackers.
struct Clients {
    progress: Arc<dyn ProgressSessionClient>,
    quizzes: Arc<dyn QuizAttemptClient>,
}

impl Clients {
    fn http() -> Result<Self, Box<dyn std::error::Error>> {
        let config = HttpAuthorityConfig::from_env()?;
        tracing::info!(base_url = %config.base_url, "using HTTP authority");
        let authority = Arc::new(HttpAuthority::new(config));
        Ok(Self {
            progress: authority.clone(),
            quizzes: authority,
        })
    }

    /// In-memory authority seeded so every flow can finish offline.
    fn demo(args: &Args) -> Self {
        let authority = InMemoryAuthority::new(Clock::system());
        authority.complete_after_heartbeats(args.lesson_id, 3);
        if let Some(quiz_id) = args.quiz_id {
            authority.register_quiz(quiz_id, QuizDefinition {
                time_limit_seconds: 30,
                answer_key: HashMap::from([
                    (QuestionId::new(1), OptionId::new(1)),
                    (QuestionId::new(2), OptionId::new(2)),
                ]),
                pass_score: 50.0,
            });
        }
        tracing::info!("using in-memory demo authority");
        Self {
            progress: Arc::new(authority.clone()),
            quizzes: Arc::new(authority),
        }
    }
}

/// Stand-in player whose position advances with wall time, optionally
/// jumping forward once two seconds into playback.
struct SimulatedPlayer {
    started: Instant,
    seek_seconds: Option<f64>,
}

impl MediaPositionSource for SimulatedPlayer {
    fn current_position(&self) -> Option<f64> {
        let elapsed = self.started.elapsed().as_secs_f64();
        let jump = self.seek_seconds.filter(|_| elapsed >= 2.0).unwrap_or(0.0);
        Some(elapsed + jump)
    }
}

fn single_lesson_gate(args: &Args, lesson_type: LessonType) -> CompletionGate {
    let lesson = LessonRef::new(
        args.lesson_id,
        SectionId::new(0),
        format!("Lesson {}", args.lesson_id),
        lesson_type,
    )
    .with_duration(args.duration_seconds);
    CompletionGate::new(CourseNav::new(vec![lesson], Viewer::Owner))
}

async fn wait_for_completion(gate: &CompletionGate, timeout: Duration) -> bool {
    let mut percentage = gate.subscribe();
    tokio::time::timeout(timeout, percentage.wait_for(|value| *value == 100))
        .await
        .is_ok_and(|changed| changed.is_ok())
}

async fn run_tracked(
    args: &Args,
    lesson_type: LessonType,
    config: TrackerConfig,
    clients: &Clients,
) -> Result<(), Box<dyn std::error::Error>> {
    let gate = single_lesson_gate(args, lesson_type);
    let manager = ProgressSessionManager::new(
        Arc::clone(&clients.progress),
        config.clone(),
        gate.completion_callback(),
    );

    let handle = manager.attach(args.lesson_id, lesson_type, args.duration_seconds, false);
    let monitor = (lesson_type == LessonType::Video).then(|| {
        let player = Arc::new(SimulatedPlayer {
            started: Instant::now(),
            seek_seconds: args.seek_seconds,
        });
        SeekMonitor::start(player, &config)
    });
    manager.on_play().await;

    let completed = wait_for_completion(&gate, args.timeout).await;
    let snapshot = handle.snapshot();
    manager.detach();

    if let Some(monitor) = &monitor {
        tracing::info!(anomalies = monitor.anomaly_count(), "seek monitor summary");
    }
    if completed {
        tracing::info!(lesson_id = %args.lesson_id, resume_position = snapshot.resume_position, "lesson completed");
    } else {
        tracing::warn!(lesson_id = %args.lesson_id, "lesson not completed before timeout");
    }
    Ok(())
}

async fn run_quiz(
    args: &Args,
    config: &TrackerConfig,
    clients: &Clients,
) -> Result<(), Box<dyn std::error::Error>> {
    let quiz_id = args.quiz_id.ok_or(ArgsError::MissingFlag { flag: "--quiz" })?;
    let gate = single_lesson_gate(args, LessonType::Quiz);
    let engine = QuizAttemptEngine::new(
        Arc::clone(&clients.quizzes),
        args.lesson_id,
        Clock::system(),
        config,
        gate.completion_callback(),
    );

    let opened = engine.start(quiz_id).await?;
    tracing::info!(
        remaining = opened.remaining_seconds,
        questions = opened.total_questions,
        "attempt open"
    );
    for (question, option) in &args.answers {
        if !engine.select_answer(*question, *option) {
            tracing::warn!(%question, %option, "answer not recorded");
        }
    }

    match engine.submit().await? {
        SubmitOutcome::Submitted(result) => tracing::info!(
            score = result.score,
            passed = result.passed,
            correct = result.correct_answers,
            total = result.total_questions,
            "attempt graded"
        ),
        SubmitOutcome::Expired(result) => {
            tracing::warn!(score = result.score, "attempt expired before grading");
        }
        SubmitOutcome::Ignored => tracing::warn!("attempt was already settled"),
    }
    tracing::info!(percentage = gate.progress_percentage(), "course progress");
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let mut iter = argv.into_iter();

    let cmd = match iter.next().as_deref() {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let args = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let mut config = TrackerConfig::from_env()?;
    let clients = if args.demo {
        config = config
            .with_heartbeat_interval(Duration::from_secs(1))
            .with_dwell_threshold(Duration::from_secs(3));
        Clients::demo(&args)
    } else {
        Clients::http()?
    };

    match cmd {
        Command::Watch => run_tracked(&args, LessonType::Video, config, &clients).await,
        Command::Read => run_tracked(&args, LessonType::Reading, config, &clients).await,
        Command::Quiz => run_quiz(&args, &config, &clients).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(log_fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "run failed");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|arg| (*arg).to_string());
        Args::parse(&mut iter)
    }

    #[test]
    fn parses_quiz_flags() {
        let args = parse(&["--lesson", "3", "--quiz", "9", "--answer", "1=2", "--demo"]).unwrap();
        assert_eq!(args.lesson_id, LessonId::new(3));
        assert_eq!(args.quiz_id, Some(QuizId::new(9)));
        assert_eq!(args.answers, vec![(QuestionId::new(1), OptionId::new(2))]);
        assert!(args.demo);
    }

    #[test]
    fn lesson_is_required() {
        assert!(matches!(
            parse(&["--demo"]),
            Err(ArgsError::MissingFlag { flag: "--lesson" })
        ));
    }

    #[test]
    fn malformed_answers_are_rejected() {
        assert!(matches!(
            parse(&["--lesson", "1", "--answer", "1:2"]),
            Err(ArgsError::InvalidAnswer { .. })
        ));
        assert!(matches!(
            parse(&["--lesson", "x"]),
            Err(ArgsError::InvalidNumber { flag: "--lesson", .. })
        ));
    }

    #[test]
    fn simulated_player_jumps_after_two_seconds() {
        let player = SimulatedPlayer {
            started: Instant::now() - Duration::from_secs(3),
            seek_seconds: Some(30.0),
        };
        assert!(player.current_position().is_some_and(|position| position >= 33.0));
        assert_eq!(Command::from_arg("watch"), Some(Command::Watch));
        assert_eq!(Command::from_arg("seed"), None);
    }
}
