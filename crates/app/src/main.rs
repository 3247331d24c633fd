use std::fmt;

use edu_core::model::{LessonFilter, LessonId, QuizId, Subject, UserId};
use services::sessions::{QuestionMarker, format_countdown};
use services::{ActiveQuiz, AppConfig, AppServices, Clock, DataSource, QuizCompletion};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidUserId { raw: String },
    InvalidSubject { raw: String },
    InvalidLimit { raw: String },
    MissingQuizId,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidSubject { raw } => write!(f, "unknown subject: {raw}"),
            ArgsError::InvalidLimit { raw } => write!(f, "invalid --limit value: {raw}"),
            ArgsError::MissingQuizId => write!(f, "quiz requires a quiz id"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  eduspark [options] stats");
    eprintln!("  eduspark [options] lessons [--subject <name>] [--search <text>]");
    eprintln!("  eduspark [options] quiz <quiz_id>");
    eprintln!("  eduspark [options] complete <lesson_id>");
    eprintln!("  eduspark [options] leaderboard [--limit <n>]");
    eprintln!("  eduspark [options] badges");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <url|memory>   SQLite URL or `memory` (default: sqlite://eduspark.sqlite3)");
    eprintln!("  --user <id>         Signed-in user (default: user1)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EDU_DB_URL, EDU_USER_ID, EDU_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Stats,
    Lessons(LessonFilter),
    Quiz(QuizId),
    Complete(LessonId),
    Leaderboard { limit: usize },
    Badges,
}

struct Args {
    config: AppConfig,
    command: Command,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut config = AppConfig::from_env();
        let mut positional = Vec::new();
        let mut filter = LessonFilter::default();
        let mut limit = 10;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    config = config.with_db_url(&normalize_sqlite_url(value));
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    let user_id: UserId = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                    config = config.with_user_id(user_id);
                }
                "--subject" => {
                    let value = require_value(&mut args, "--subject")?;
                    let subject = Subject::parse(&value)
                        .ok_or_else(|| ArgsError::InvalidSubject { raw: value.clone() })?;
                    filter.subject = Some(subject);
                }
                "--search" => filter.query = require_value(&mut args, "--search")?,
                "--limit" => {
                    let value = require_value(&mut args, "--limit")?;
                    limit = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLimit { raw: value.clone() })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let command = match positional.next().as_deref() {
            None | Some("stats") => Command::Stats,
            Some("lessons") => Command::Lessons(filter),
            Some("quiz") => {
                let raw = positional.next().ok_or(ArgsError::MissingQuizId)?;
                Command::Quiz(raw.parse().map_err(|_| ArgsError::MissingQuizId)?)
            }
            Some("complete") => {
                let raw = positional
                    .next()
                    .ok_or(ArgsError::MissingValue { flag: "complete" })?;
                Command::Complete(LessonId::new(raw.trim()))
            }
            Some("leaderboard") => Command::Leaderboard { limit },
            Some("badges") => Command::Badges,
            Some(other) => return Err(ArgsError::UnknownArg(other.to_owned())),
        };
        if let Some(extra) = positional.next() {
            return Err(ArgsError::UnknownArg(extra));
        }

        Ok(Self { config, command })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case(services::app_services::MEMORY_DB)
        || trimmed.starts_with("sqlite::memory:")
        || trimmed.starts_with("sqlite://")
    {
        return trimmed.to_owned();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let app = AppServices::open(&args.config, Clock::default()).await;
    if app.source() == DataSource::Demo {
        eprintln!("(demo mode: changes will not be saved)");
    }

    match args.command {
        Command::Stats => show_stats(&app).await?,
        Command::Lessons(filter) => show_lessons(&app, &filter).await,
        Command::Quiz(quiz_id) => take_quiz(&app, &quiz_id).await?,
        Command::Complete(lesson_id) => {
            let done = app
                .progress()
                .complete_lesson(app.user_id(), &lesson_id)
                .await?;
            println!(
                "Lesson {} completed: +{} XP (total {})",
                done.progress.lesson_id, done.xp_awarded, done.total_xp
            );
            show_new_badges(&app).await?;
        }
        Command::Leaderboard { limit } => {
            for entry in app.progress().leaderboard(limit).await? {
                println!(
                    "{:>3}. {:<20} {:>6} XP  level {}",
                    entry.rank, entry.name, entry.xp, entry.level
                );
            }
        }
        Command::Badges => {
            for badge in app.progress().badge_progress(app.user_id()).await? {
                let mark = if badge.unlocked { "x" } else { " " };
                println!("[{mark}] {:<14} {:>3}%", badge.name, badge.percent);
            }
        }
    }
    Ok(())
}

async fn show_stats(app: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    let user = app.catalog().user(app.user_id()).await;
    let Some(user) = user.value else {
        println!("No user {}", app.user_id());
        return Ok(());
    };
    let stats = app.progress().dashboard(&user.id).await?;
    println!("{} (level {})", user.name, stats.level);
    println!(
        "  XP {}  |  {} to next level  |  {}% through this level",
        stats.xp, stats.xp_to_next_level, stats.level_progress_percent
    );
    println!("  Streak {} days  |  {} badges", stats.streak, stats.badge_count);
    println!(
        "  Lessons completed {}  |  quizzes taken {} (passed {})",
        stats.lessons_completed, stats.quizzes_taken, stats.quizzes_passed
    );
    if let Some(avg) = stats.average_score {
        println!("  Average score {}%", avg.value());
    }
    Ok(())
}

async fn show_lessons(app: &AppServices, filter: &LessonFilter) {
    let catalog = app.catalog();
    let lessons = catalog.filter_lessons(filter).await.value;
    if lessons.is_empty() {
        println!("No lessons match.");
    }
    for lesson in lessons {
        println!(
            "{:<10} {:<30} {:<10} grade {:<2} {:>3} min  +{} XP",
            lesson.id,
            lesson.title,
            lesson.subject.as_str(),
            lesson.grade,
            lesson.duration_minutes,
            lesson.xp_reward
        );
        for quiz in catalog.quizzes_for_lesson(&lesson.id).await.value {
            println!("           quiz {}: {}", quiz.id, quiz.title);
        }
    }
}

async fn show_new_badges(app: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    for badge in app.progress().evaluate_badges(app.user_id()).await? {
        println!("Badge unlocked: {} {}", badge.icon, badge.name);
    }
    Ok(())
}

async fn take_quiz(app: &AppServices, quiz_id: &QuizId) -> Result<(), Box<dyn std::error::Error>> {
    let Some(quiz) = app.catalog().quiz(quiz_id).await.value else {
        println!("No quiz {quiz_id}");
        return Ok(());
    };
    let active = app
        .session_loop()
        .start_with_quiz(app.user_id().clone(), std::sync::Arc::new(quiz))?;

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let completion = loop {
        render(&active);
        tokio::select! {
            completion = active.wait_for_completion() => {
                println!();
                println!("Time is up!");
                break completion;
            }
            line = input.next_line() => {
                let Some(line) = line? else {
                    active.close();
                    return Ok(());
                };
                match handle_input(&active, line.trim()).await? {
                    Step::Continue => {}
                    Step::Quit => {
                        active.close();
                        println!("Quiz closed, nothing saved.");
                        return Ok(());
                    }
                    Step::Done(completion) => break Some(completion),
                }
            }
        }
    };

    if let Some(completion) = completion {
        report(&completion);
        if completion.recorded().is_some() {
            show_new_badges(app).await?;
        }
    }
    Ok(())
}

enum Step {
    Continue,
    Quit,
    Done(QuizCompletion),
}

async fn handle_input(active: &ActiveQuiz, line: &str) -> Result<Step, Box<dyn std::error::Error>> {
    let view = active.view();
    match line {
        "q" => return Ok(Step::Quit),
        "p" if view.can_go_previous() => {
            active.previous()?;
        }
        "n" if view.can_go_next() => {
            active.next()?;
        }
        "s" if view.can_submit() => return Ok(Step::Done(active.submit().await?)),
        choice => {
            let options = view.question.options.clone().unwrap_or_default();
            match choice.parse::<usize>().ok().and_then(|n| options.get(n.wrapping_sub(1))) {
                Some(option) => active.answer(view.question_id(), option.clone())?,
                None => println!("Pick an option number, or n/p/s/q."),
            }
        }
    }
    Ok(Step::Continue)
}

fn render(active: &ActiveQuiz) {
    let view = active.view();
    let strip: String = view
        .markers
        .iter()
        .map(|m| match m {
            QuestionMarker::Current => '>',
            QuestionMarker::Answered => '*',
            QuestionMarker::Unanswered => '.',
        })
        .collect();
    println!();
    println!(
        "{}  [{}]  question {}/{}  time {}",
        view.title,
        strip,
        view.index + 1,
        view.total,
        format_countdown(view.time_remaining_secs)
    );
    println!("{}", view.question.prompt);
    for (i, option) in view.question.options.iter().flatten().enumerate() {
        let mark = if view.selected.as_deref() == Some(option.as_str()) { "(o)" } else { "( )" };
        println!("  {mark} {}. {option}", i + 1);
    }
    let option_count = view.question.options.as_ref().map_or(0, Vec::len);
    let mut actions: Vec<String> = answer_hint(option_count).into_iter().collect();
    if view.can_go_previous() {
        actions.push("p previous".to_owned());
    }
    if view.can_go_next() {
        actions.push("n next".to_owned());
    }
    if view.can_submit() {
        actions.push("s submit".to_owned());
    }
    actions.push("q quit".to_owned());
    print!("{} > ", actions.join(", "));
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

fn report(completion: &QuizCompletion) {
    let result = completion.result_view();
    println!("{}  Score {}%", result.headline(), result.score.value());
    match completion {
        QuizCompletion::Recorded(recorded) => println!(
            "+{} XP, now {} XP (level {})",
            recorded.xp_gain, recorded.total_xp, recorded.level
        ),
        QuizCompletion::Failed { error, .. } => println!("Could not save this attempt: {error}"),
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_env("EDU_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        let _ = tokio::io::stderr().flush().await;
        std::process::exit(2);
    }
}

fn answer_hint(option_count: usize) -> Option<String> {
    match option_count {
        0 => None,
        1 => Some("1 answer".to_owned()),
        n => Some(format!("1-{n} answer")),
    }
}
