mod config;
mod db;
mod error;
mod models;
mod scheduler;

use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

use config::Config;
use db::Database;
use error::SchedulerError;
use models::{Confidence, JsonOutput, Problem, ReviewPlan};
use scheduler::{QueryKind, Scheduler};

#[derive(Parser)]
#[command(name = "drill")]
#[command(about = "A spaced-repetition scheduler for practice problems")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage problems
    #[command(subcommand)]
    Problem(ProblemCommands),

    /// List all tags
    Tags,

    /// Show review statistics
    Stats,

    /// Plans due now, including overdue ones
    Due,

    /// Plans scheduled for today
    Today,

    /// Plans scheduled before today
    Overdue,

    /// Plans scheduled this week (Monday to Sunday)
    Week,

    /// Record a grade for a review plan
    Complete {
        /// Review plan ID
        plan: i64,

        /// Recall grade from 0 (blank) to 5 (perfect)
        #[arg(long, short)]
        score: i32,

        /// Confidence: 1-5 or very-low/low/medium/high/very-high
        #[arg(long, short, default_value = "medium")]
        confidence: String,

        /// Time spent on the review, in seconds
        #[arg(long)]
        time_spent: Option<i64>,
    },

    /// Move a plan to the end of today's queue
    Skip {
        /// Review plan ID
        plan: i64,

        /// Skip until tomorrow instead
        #[arg(long)]
        tomorrow: bool,
    },

    /// Postpone a plan by a number of days
    Postpone {
        /// Review plan ID
        plan: i64,

        /// Days to postpone by
        #[arg(long, short)]
        days: i64,
    },

    /// Show all review plans of a problem
    History {
        /// Problem ID
        problem: i64,
    },
}

#[derive(Subcommand)]
enum ProblemCommands {
    /// List all problems
    List {
        /// Filter by tag
        #[arg(long, short)]
        tag: Option<String>,
    },

    /// Add a new problem and schedule its first review
    Add {
        /// Problem title
        title: String,

        /// Where the problem comes from (URL, book, contest)
        #[arg(long, short)]
        source: Option<String>,

        /// Comma-separated tags
        #[arg(long, short)]
        tags: Option<String>,
    },

    /// Show problem details
    Show {
        /// Problem ID
        id: i64,
    },

    /// Delete a problem and its review plans
    Delete {
        /// Problem ID
        id: i64,
    },

    /// Update problem tags
    Tag {
        /// Problem ID
        id: i64,

        /// Comma-separated tags (replaces existing)
        #[arg(long, short)]
        tags: String,
    },

    /// Schedule a first review for a problem without an active plan
    Schedule {
        /// Problem ID
        id: i64,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&config.log_filter);

    let json = cli.json;
    if let Err(e) = run(cli, &config) {
        let retryable = e
            .downcast_ref::<SchedulerError>()
            .is_some_and(SchedulerError::is_retryable);
        tracing::debug!(retryable, error = %e, "command failed");

        if json {
            match serde_json::to_string(&JsonOutput::<()>::err(e.to_string())) {
                Ok(out) => println!("{}", out),
                Err(_) => eprintln!("Error: {}", e),
            }
        } else {
            eprintln!("Error: {}", e);
            if retryable {
                eprintln!("Nothing was saved; the command can be retried.");
            }
        }
        std::process::exit(1);
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

fn run(cli: Cli, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(&config.db_path)?;
    db.init()?;
    tracing::debug!(path = %config.db_path.display(), "opened database");

    let offset = config.utc_offset;
    let scheduler = Scheduler::with_offset(db, offset);
    let now = Utc::now();

    match cli.command {
        Commands::Init => {
            if cli.json {
                print_json(&JsonOutput::<()>::ok(()))?;
            } else {
                println!("Database initialized at: {}", config.db_path.display());
            }
        }

        Commands::Problem(problem_cmd) => match problem_cmd {
            ProblemCommands::List { tag } => {
                let problems = scheduler.list_problems(tag.as_deref())?;
                if cli.json {
                    print_json(&JsonOutput::ok(&problems))?;
                } else if problems.is_empty() {
                    println!("No problems found.");
                } else {
                    println!("{:<5} {:<40} {:<12} TAGS", "ID", "TITLE", "MASTERY");
                    println!("{}", "-".repeat(75));
                    for problem in problems {
                        println!(
                            "{:<5} {:<40} {:<12} {}",
                            problem.id,
                            truncate(&problem.title, 38),
                            problem.mastery_label(),
                            tag_list(&problem)
                        );
                    }
                }
            }

            ProblemCommands::Add {
                title,
                source,
                tags,
            } => {
                let tags = split_tags(tags.as_deref().unwrap_or(""));
                let (problem, plan) =
                    scheduler.add_problem(&title, source.as_deref(), &tags, now)?;

                if cli.json {
                    print_json(&JsonOutput::ok(serde_json::json!({
                        "problem": problem,
                        "plan": plan
                    })))?;
                } else {
                    println!("Added problem '{}' with ID: {}", problem.title, problem.id);
                    println!(
                        "First review (plan {}) scheduled: {}",
                        plan.id,
                        local_time(plan.scheduled_at, offset)
                    );
                }
            }

            ProblemCommands::Show { id } => {
                if let Some(problem) = scheduler.get_problem(id)? {
                    let active = scheduler.active_plan(id)?;

                    if cli.json {
                        print_json(&JsonOutput::ok(serde_json::json!({
                            "problem": problem,
                            "active_plan": active
                        })))?;
                    } else {
                        println!("Problem: {}", problem.title);
                        println!("ID: {}", problem.id);
                        if let Some(source) = &problem.source {
                            println!("Source: {}", source);
                        }
                        println!("Tags: {}", tag_list(&problem));
                        println!("Created: {}", local_time(problem.created_at, offset));

                        println!();
                        println!("--- Performance ---");
                        println!("Mastery: {} ({}/5)", problem.mastery_label(), problem.mastery);
                        println!(
                            "Reviews: {} (average score {:.1})",
                            problem.total_reviews, problem.average_score
                        );
                        if let Some(last) = problem.last_practiced_at {
                            println!("Last practiced: {}", local_time(last, offset));
                        }
                        match active {
                            Some(plan) => println!(
                                "Next review: {} (plan {}, level {}, {})",
                                local_time(plan.scheduled_at, offset),
                                plan.id,
                                plan.level,
                                plan.status.label()
                            ),
                            None => println!("Next review: none scheduled"),
                        }
                    }
                } else if cli.json {
                    print_json(&JsonOutput::<()>::err("Problem not found"))?;
                } else {
                    println!("Problem not found.");
                }
            }

            ProblemCommands::Delete { id } => {
                if scheduler.delete_problem(id)? {
                    if cli.json {
                        print_json(&JsonOutput::<()>::ok(()))?;
                    } else {
                        println!("Problem {} deleted.", id);
                    }
                } else if cli.json {
                    print_json(&JsonOutput::<()>::err("Problem not found"))?;
                } else {
                    println!("Problem not found.");
                }
            }

            ProblemCommands::Tag { id, tags } => {
                scheduler.update_problem_tags(id, &split_tags(&tags))?;

                if cli.json {
                    print_json(&JsonOutput::<()>::ok(()))?;
                } else {
                    println!("Updated tags for problem {}.", id);
                }
            }

            ProblemCommands::Schedule { id } => {
                let plan = scheduler.create_initial(id, now)?;

                if cli.json {
                    print_json(&JsonOutput::ok(&plan))?;
                } else {
                    println!(
                        "Scheduled plan {} for problem {}: {}",
                        plan.id,
                        id,
                        local_time(plan.scheduled_at, offset)
                    );
                }
            }
        },

        Commands::Tags => {
            let tags = scheduler.list_tags()?;
            if cli.json {
                print_json(&JsonOutput::ok(&tags))?;
            } else if tags.is_empty() {
                println!("No tags found.");
            } else {
                println!("{:<5} {:<30} PROBLEMS", "ID", "TAG");
                println!("{}", "-".repeat(50));
                for tag in tags {
                    println!("{:<5} {:<30} {}", tag.id, tag.name, tag.problem_count);
                }
            }
        }

        Commands::Stats => {
            let stats = scheduler.stats(now)?;
            if cli.json {
                print_json(&JsonOutput::ok(&stats))?;
            } else {
                println!("=== Review Statistics ===");
                println!("Total problems: {}", stats.total_problems);
                println!("Total reviews: {}", stats.total_reviews);
                println!("Mastered (mastery 4+): {}", stats.mastered);
                println!("Due for review: {}", stats.due_now);
                println!("Overdue: {}", stats.overdue);
                println!("Average mastery: {:.1}/5", stats.avg_mastery);
            }
        }

        Commands::Due => {
            let plans = scheduler.due(now);
            show_plans(&scheduler, QueryKind::Due, &plans, offset, cli.json)?;
        }

        Commands::Today => {
            let plans = scheduler.today(now);
            show_plans(&scheduler, QueryKind::Today, &plans, offset, cli.json)?;
        }

        Commands::Overdue => {
            let plans = scheduler.overdue(now);
            show_plans(&scheduler, QueryKind::Overdue, &plans, offset, cli.json)?;
        }

        Commands::Week => {
            let plans = scheduler.this_week(now);
            show_plans(&scheduler, QueryKind::ThisWeek, &plans, offset, cli.json)?;
        }

        Commands::Complete {
            plan,
            score,
            confidence,
            time_spent,
        } => {
            let confidence = Confidence::from_str(&confidence).ok_or_else(|| {
                format!(
                    "Invalid confidence '{}'. Use 1-5 or: very-low, low, medium, high, very-high",
                    confidence
                )
            })?;

            let next = scheduler.complete(plan, score, confidence, time_spent, now)?;

            if cli.json {
                print_json(&JsonOutput::ok(&next))?;
            } else {
                println!("Review recorded for plan {}.", plan);
                if let Some(problem) = scheduler.get_problem(next.problem_id)? {
                    println!(
                        "Mastery: {} ({}/5)",
                        problem.mastery_label(),
                        problem.mastery
                    );
                }
                println!(
                    "Next review (plan {}, level {}) scheduled: {}",
                    next.id,
                    next.level,
                    local_time(next.scheduled_at, offset)
                );
            }
        }

        Commands::Skip { plan, tomorrow } => {
            let moved = if tomorrow {
                scheduler.skip_until_tomorrow(plan, now)?
            } else {
                scheduler.skip(plan, now)?
            };

            if cli.json {
                print_json(&JsonOutput::ok(&moved))?;
            } else {
                println!(
                    "Plan {} moved to {}.",
                    moved.id,
                    local_time(moved.scheduled_at, offset)
                );
            }
        }

        Commands::Postpone { plan, days } => {
            let moved = scheduler.postpone(plan, days, now)?;

            if cli.json {
                print_json(&JsonOutput::ok(&moved))?;
            } else {
                println!(
                    "Plan {} postponed to {}.",
                    moved.id,
                    local_time(moved.scheduled_at, offset)
                );
            }
        }

        Commands::History { problem } => {
            if scheduler.get_problem(problem)?.is_none() {
                return Err(SchedulerError::ProblemNotFound(problem).into());
            }
            let plans = scheduler.plan_history(problem)?;

            if cli.json {
                print_json(&JsonOutput::ok(&plans))?;
            } else {
                println!(
                    "{:<6} {:<17} {:<10} {:<6} {:<6} CONFIDENCE",
                    "PLAN", "SCHEDULED", "STATUS", "LEVEL", "SCORE"
                );
                println!("{}", "-".repeat(65));
                for plan in plans {
                    println!(
                        "{:<6} {:<17} {:<10} {:<6} {:<6} {}",
                        plan.id,
                        local_time(plan.scheduled_at, offset),
                        plan.status.label(),
                        plan.level,
                        plan.score.map_or("-".to_string(), |s| s.to_string()),
                        plan.confidence.map_or("-", |c| c.label())
                    );
                }
            }
        }
    }

    Ok(())
}

fn show_plans(
    scheduler: &Scheduler,
    kind: QueryKind,
    plans: &[ReviewPlan],
    offset: FixedOffset,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        return print_json(&JsonOutput::ok(plans));
    }
    if plans.is_empty() {
        println!("Nothing {}.", empty_label(kind));
        return Ok(());
    }

    let titles: HashMap<i64, String> = scheduler
        .list_problems(None)?
        .into_iter()
        .map(|p| (p.id, p.title))
        .collect();

    println!(
        "{:<6} {:<40} {:<17} {:<10} LEVEL",
        "PLAN", "PROBLEM", "SCHEDULED", "STATUS"
    );
    println!("{}", "-".repeat(85));
    for plan in plans {
        let title = titles.get(&plan.problem_id).map_or("?", String::as_str);
        println!(
            "{:<6} {:<40} {:<17} {:<10} {}",
            plan.id,
            truncate(title, 38),
            local_time(plan.scheduled_at, offset),
            plan.status.label(),
            plan.level
        );
    }
    Ok(())
}

fn empty_label(kind: QueryKind) -> &'static str {
    match kind {
        QueryKind::Due => "due",
        QueryKind::Today => "scheduled for today",
        QueryKind::Overdue => "overdue",
        QueryKind::ThisWeek => "scheduled this week",
    }
}

fn print_json<T: Serialize>(value: &JsonOutput<T>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn tag_list(problem: &Problem) -> String {
    if problem.tags.is_empty() {
        String::from("-")
    } else {
        problem.tags.join(", ")
    }
}

fn local_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
