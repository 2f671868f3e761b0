//! wikisocial - profile subsystem inspection CLI
//!
//! Stands in for the presenter boundary: seeds or opens a profile
//! database and prints profile pages, feeds, and relationship lists as
//! text or JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use wikisocial_core::visibility::{PrivacyLevel, ProfileField};
use wikisocial_core::{
    ActivityAggregator, ActivityFeed, ActivityItem, ActivityKind, ActivityPayload, ActorId, Config,
    Database, Deadline, FeedFilter, FeedRequest, FeedScope, MemoryRelationshipCache, PageRef,
    ProfileRenderData, ProfileService, RelationshipService, RelationshipType, SectionOutcome,
    Viewer, VisibilityFilter,
};

#[derive(Parser, Debug)]
#[command(name = "wikisocial")]
#[command(about = "Inspect wiki profile feeds, relationships, and visibility")]
#[command(version)]
struct Args {
    /// Database path (default: XDG data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a small demo database
    Seed,

    /// Assemble the full profile page for an owner
    Profile {
        /// Profile owner's actor id
        owner: u64,

        /// Viewing actor id (omit for an anonymous viewer)
        #[arg(long)]
        viewer: Option<u64>,
    },

    /// Build an activity feed
    Feed {
        /// Profile owner's actor id
        owner: u64,

        /// Viewing actor id (omit for an anonymous viewer)
        #[arg(long)]
        viewer: Option<u64>,

        /// Feed scope: owner, friends, or foes
        #[arg(long, default_value = "owner")]
        scope: String,

        /// Comma-separated kinds (edit, vote, friend_added, foe_added,
        /// user_message, system_message); default is everything except votes
        #[arg(long)]
        kinds: Option<String>,

        /// Display limit override
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List an owner's relationships
    Relationships {
        /// Owner's actor id
        owner: u64,

        /// Relationship type: friend or foe
        #[arg(long = "type", default_value = "friend")]
        rel_type: String,

        /// How many records to fetch
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
}

struct App {
    db: Arc<Database>,
    config: Config,
    relationships: Arc<RelationshipService>,
}

impl App {
    fn open(db_path: Option<PathBuf>, config: Config) -> Result<Self> {
        let path = db_path.unwrap_or_else(Config::database_path);
        let db = Arc::new(Database::open(&path).context("failed to open database")?);
        db.migrate().context("failed to run migrations")?;
        let relationships = Arc::new(RelationshipService::new(
            db.clone(),
            Arc::new(MemoryRelationshipCache::new()),
        ));
        Ok(App {
            db,
            config,
            relationships,
        })
    }

    fn aggregator(&self) -> ActivityAggregator {
        ActivityAggregator::new(
            self.db.clone(),
            self.relationships.clone(),
            self.config.feed.clone(),
        )
    }

    fn profile_service(&self) -> ProfileService {
        ProfileService::new(
            self.db.clone(),
            self.relationships.clone(),
            VisibilityFilter::new(self.db.clone(), self.db.clone()),
            self.aggregator(),
            self.config.clone(),
        )
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = wikisocial_core::logging::init(&config.logging).ok();

    let app = App::open(args.db.clone(), config)?;

    match args.command {
        Command::Seed => seed(&app),
        Command::Profile { owner, viewer } => {
            let page = app.profile_service().assemble(
                ActorId(owner),
                to_viewer(viewer),
                Deadline::UNBOUNDED,
            );
            if args.json {
                print_json(&page)
            } else {
                print_profile(&page);
                Ok(())
            }
        }
        Command::Feed {
            owner,
            viewer,
            scope,
            kinds,
            limit,
        } => {
            let mut request = FeedRequest::new(ActorId(owner), to_viewer(viewer));
            request.scope = parse_scope(&scope)?;
            request.filter = parse_kinds(kinds.as_deref())?;
            request.display_limit = limit;

            let feed = app
                .aggregator()
                .build_feed(&request)
                .context("failed to build feed")?;
            if args.json {
                print_json(&feed)
            } else {
                print_feed(&feed);
                Ok(())
            }
        }
        Command::Relationships {
            owner,
            rel_type,
            count,
        } => {
            let rel_type: RelationshipType = rel_type
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let preview = app
                .relationships
                .preview(ActorId(owner), rel_type, count)
                .context("failed to list relationships")?;
            if args.json {
                print_json(&preview)
            } else {
                println!(
                    "{} {}(s) (showing {})",
                    preview.total,
                    rel_type,
                    preview.records.len()
                );
                for record in &preview.records {
                    println!(
                        "   actor {:<8} since {}",
                        record.actor_id,
                        record.established_at.format("%Y-%m-%d %H:%M")
                    );
                }
                Ok(())
            }
        }
    }
}

fn to_viewer(viewer: Option<u64>) -> Viewer {
    match viewer {
        Some(id) => Viewer::Actor(ActorId(id)),
        None => Viewer::Anonymous,
    }
}

fn parse_scope(scope: &str) -> Result<FeedScope> {
    match scope {
        "owner" => Ok(FeedScope::Owner),
        "friends" => Ok(FeedScope::Network(RelationshipType::Friend)),
        "foes" => Ok(FeedScope::Network(RelationshipType::Foe)),
        other => anyhow::bail!("Unknown scope: {}. Use 'owner', 'friends', or 'foes'", other),
    }
}

fn parse_kinds(kinds: Option<&str>) -> Result<FeedFilter> {
    let Some(kinds) = kinds else {
        return Ok(FeedFilter::all());
    };
    let parsed: Vec<ActivityKind> = kinds
        .split(',')
        .map(|k| k.trim().parse().map_err(|e: String| anyhow::anyhow!(e)))
        .collect::<Result<_>>()?;
    FeedFilter::only(&parsed).context("invalid kind selection")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_feed(feed: &ActivityFeed) {
    if let Some(signal) = feed.signal {
        println!("feed degraded: {:?}", signal);
        return;
    }
    println!(
        "{} of {} item(s), limit {}{}",
        feed.len(),
        feed.total_count,
        feed.display_limit,
        if feed.truncated { " (truncated)" } else { "" }
    );
    for entry in &feed.items {
        let group = match (entry.group.first, entry.group.last) {
            (true, true) => " ",
            (true, false) => "┌",
            (false, false) => "│",
            (false, true) => "└",
        };
        println!(
            " {} {} actor {:<6} {:<15} {}{}",
            group,
            entry.item.timestamp.format("%Y-%m-%d %H:%M"),
            entry.item.actor_id,
            entry.item.kind().to_string(),
            describe(&entry.item),
            if entry.boundary { "  <- boundary" } else { "" }
        );
    }
}

fn describe(item: &ActivityItem) -> String {
    match &item.payload {
        ActivityPayload::Edit { page, summary } => {
            let target = page
                .as_ref()
                .map(|p| p.title.clone())
                .unwrap_or_else(|| "(no target)".to_string());
            match summary {
                Some(summary) => format!("{} \"{}\"", target, summary),
                None => target,
            }
        }
        ActivityPayload::Vote { page } => page
            .as_ref()
            .map(|p| p.title.clone())
            .unwrap_or_else(|| "(no target)".to_string()),
        ActivityPayload::FriendAdded { other } => format!("befriended actor {}", other),
        ActivityPayload::FoeAdded { other } => format!("marked actor {} as foe", other),
        ActivityPayload::UserMessage { to, comment, private } => {
            format!(
                "to actor {}{}: \"{}\"",
                to,
                if *private { " (private)" } else { "" },
                comment
            )
        }
        ActivityPayload::SystemMessage { comment } => comment.clone(),
    }
}

fn print_profile(page: &ProfileRenderData) {
    println!("Profile of actor {}", page.owner);
    println!();

    print_section("Personal", &page.personal, |fields| {
        for field in fields.visible() {
            println!("   {}", field);
        }
    });
    print_section("Interests", &page.interests, |fields| {
        for field in fields.visible() {
            println!("   {}", field);
        }
    });
    print_section("Stats", &page.stats, |stats| {
        println!(
            "   Edits: {:<8} Votes: {:<8} Messages: {}",
            stats.edits, stats.votes, stats.user_messages
        );
        println!("   Friends: {:<6} Foes: {}", stats.friends, stats.foes);
    });
    print_section("Friends", &page.friends, |preview| {
        for record in &preview.records {
            println!("   actor {}", record.actor_id);
        }
        if preview.has_more() {
            println!("   ... {} total", preview.total);
        }
    });
    print_section("Foes", &page.foes, |preview| {
        for record in &preview.records {
            println!("   actor {}", record.actor_id);
        }
        if preview.has_more() {
            println!("   ... {} total", preview.total);
        }
    });
    print_section("Activity", &page.activity, print_feed);
    print_section("Board", &page.board, |board| {
        println!("   {} message(s)", board.total);
        for message in &board.messages {
            println!(
                "   {} {}",
                message.timestamp.format("%Y-%m-%d %H:%M"),
                describe(message)
            );
        }
    });
}

fn print_section<T>(title: &str, outcome: &SectionOutcome<T>, render: impl FnOnce(&T)) {
    match outcome {
        SectionOutcome::Rendered(data) => {
            println!("{}", title.to_uppercase());
            render(data);
        }
        SectionOutcome::Disabled => println!("{} (disabled)", title.to_uppercase()),
        SectionOutcome::Failed => println!("{} (unavailable)", title.to_uppercase()),
    }
    println!();
}

fn seed(app: &App) -> Result<()> {
    let now = Utc::now();
    let db = &app.db;

    for (id, name) in [(1, "alice"), (2, "bob"), (3, "carol"), (4, "dave")] {
        db.upsert_actor(ActorId(id), name)?;
    }

    for (owner, other, days) in [(1, 2, 30), (1, 3, 10), (2, 1, 30), (3, 1, 10)] {
        db.add_relationship(
            ActorId(owner),
            ActorId(other),
            RelationshipType::Friend,
            now - Duration::days(days),
        )?;
    }
    db.add_relationship(ActorId(1), ActorId(4), RelationshipType::Foe, now - Duration::days(2))?;

    for i in 0..12i64 {
        db.insert_activity(&ActivityItem {
            actor_id: ActorId(1),
            timestamp: now - Duration::hours(i),
            payload: ActivityPayload::Edit {
                page: Some(PageRef {
                    namespace: 0,
                    title: format!("Article {}", i % 4),
                }),
                summary: Some(format!("revision {}", 12 - i)),
            },
        })?;
    }
    db.insert_activity(&ActivityItem {
        actor_id: ActorId(2),
        timestamp: now - Duration::hours(3),
        payload: ActivityPayload::UserMessage {
            to: ActorId(1),
            comment: "nice work on Article 2".to_string(),
            private: false,
        },
    })?;
    db.insert_activity(&ActivityItem {
        actor_id: ActorId(3),
        timestamp: now - Duration::hours(1),
        payload: ActivityPayload::UserMessage {
            to: ActorId(1),
            comment: "re: that draft".to_string(),
            private: true,
        },
    })?;
    db.insert_activity(&ActivityItem {
        actor_id: ActorId(1),
        timestamp: now - Duration::days(1),
        payload: ActivityPayload::SystemMessage {
            comment: "reached level 3".to_string(),
        },
    })?;

    db.set_privacy(ActorId(1), ProfileField::Birthday, PrivacyLevel::Friends)?;

    println!("Seeded 4 actors, 5 relationships, 15 activity items.");
    println!("Try: wikisocial profile 1 --viewer 2");
    Ok(())
}
