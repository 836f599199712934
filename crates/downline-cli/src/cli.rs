//! Command parsing and execution against a snapshot-backed store.

use downline_rank::{
    EngineConfig, Error, MemoryStore, NetworkEvent, RankService, Result, StoreSnapshot, UserId,
    UserRecord, UserStore, WalkStop,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Default snapshot location when neither flag nor env var is set.
pub const DEFAULT_SNAPSHOT: &str = "./downline.json";

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Rank { user: UserId, use_cache: bool },
    Update { user: UserId },
    Propagate { user: UserId },
    Invalidate { user: UserId },
    RecomputeAll,
    Link { user: UserId, sponsor: UserId },
    Unlink { user: UserId },
    Remove { user: UserId },
    List,
}

impl Command {
    /// Whether the store must be written back afterwards.
    pub fn writes(&self) -> bool {
        !matches!(self, Command::List)
    }
}

/// Command plus the snapshot it runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub snapshot: PathBuf,
    pub command: Command,
}

fn required(
    args: &[String],
    index: usize,
    command: &str,
    what: &str,
) -> std::result::Result<UserId, String> {
    args.get(index)
        .map(|s| UserId::from(s.as_str()))
        .ok_or_else(|| format!("{} requires a {} argument", command, what))
}

/// Parse arguments (without the program name).
///
/// `env_snapshot` is the value of `DOWNLINE_SNAPSHOT`, if set.
pub fn parse_args(
    args: &[String],
    env_snapshot: Option<String>,
) -> std::result::Result<Invocation, String> {
    let mut snapshot = env_snapshot.map(PathBuf::from);
    let mut use_cache = true;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--snapshot" => {
                let path = iter
                    .next()
                    .ok_or_else(|| "--snapshot requires a path".to_string())?;
                snapshot = Some(PathBuf::from(path));
            }
            "--no-cache" => use_cache = false,
            _ => positional.push(arg.clone()),
        }
    }

    let name = positional
        .first()
        .ok_or_else(|| "missing command".to_string())?
        .clone();
    let command = match name.as_str() {
        "rank" => Command::Rank {
            user: required(&positional, 1, "rank", "user")?,
            use_cache,
        },
        "update" => Command::Update {
            user: required(&positional, 1, "update", "user")?,
        },
        "propagate" => Command::Propagate {
            user: required(&positional, 1, "propagate", "user")?,
        },
        "invalidate" => Command::Invalidate {
            user: required(&positional, 1, "invalidate", "user")?,
        },
        "recompute-all" => Command::RecomputeAll,
        "link" => {
            let user = required(&positional, 1, "link", "user")?;
            let sponsor = required(&positional, 2, "link", "sponsor")?;
            if user == sponsor {
                return Err(format!("{} cannot sponsor itself", user));
            }
            Command::Link { user, sponsor }
        }
        "unlink" => Command::Unlink {
            user: required(&positional, 1, "unlink", "user")?,
        },
        "remove" => Command::Remove {
            user: required(&positional, 1, "remove", "user")?,
        },
        "list" => Command::List,
        other => return Err(format!("Unknown command: {}", other)),
    };

    Ok(Invocation {
        snapshot: snapshot.unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT)),
        command,
    })
}

/// Load the snapshot, or start empty if the file does not exist yet.
pub fn load_store(path: &Path) -> Result<MemoryStore> {
    if !path.exists() {
        tracing::warn!("Snapshot {:?} not found, starting with an empty network", path);
        return Ok(MemoryStore::new());
    }
    Ok(MemoryStore::from_snapshot(StoreSnapshot::read_from(path)?))
}

/// Run an invocation and return what to print.
pub async fn run(invocation: &Invocation, config: EngineConfig) -> Result<String> {
    let store = load_store(&invocation.snapshot)?;
    let service = RankService::new(store, config);

    let output = execute(&invocation.command, &service).await?;

    if invocation.command.writes() {
        service.store().snapshot().await?.write_to(&invocation.snapshot)?;
        tracing::debug!("Wrote snapshot {:?}", invocation.snapshot);
    }
    Ok(output)
}

async fn execute(command: &Command, service: &RankService<MemoryStore>) -> Result<String> {
    let store = service.store();
    let mut out = String::new();

    match command {
        Command::Rank { user, use_cache } => {
            let rank = service.get_rank(user, *use_cache).await?;
            let _ = writeln!(out, "{}", rank);
        }

        Command::Update { user } => {
            let rank = service.try_update_rank(user).await?;
            let _ = writeln!(out, "{}", rank);
        }

        Command::Propagate { user } => {
            let report = service.propagate_upline(user).await?;
            for change in &report.updated {
                let _ = writeln!(out, "{}: {} -> {}", change.user, change.previous, change.rank);
            }
            let _ = writeln!(out, "stopped: {}", describe_stop(&report.stop));
        }

        Command::Invalidate { user } => {
            let report = service.invalidate_chain(user).await?;
            for id in &report.invalidated {
                let _ = writeln!(out, "{}", id);
            }
            let _ = writeln!(out, "stopped: {}", describe_stop(&report.stop));
        }

        Command::RecomputeAll => {
            let report = service.recompute_all().await?;
            let _ = writeln!(
                out,
                "{} users, {} changed, {} cycle cut(s)",
                report.users, report.changed, report.cycle_cuts
            );
        }

        Command::Link { user, sponsor } => {
            let event = match store.get_user(user).await? {
                Some(mut record) => {
                    let previous_sponsor = record.sponsor_id.replace(sponsor.clone());
                    store.put_user(&record).await?;
                    NetworkEvent::Responsored {
                        user: user.clone(),
                        previous_sponsor,
                    }
                }
                None => {
                    store
                        .put_user(&UserRecord::sponsored_by(user.clone(), sponsor.clone()))
                        .await?;
                    NetworkEvent::Joined { user: user.clone() }
                }
            };
            apply(service, &event, &mut out).await?;
        }

        Command::Unlink { user } => {
            let mut record = store
                .get_user(user)
                .await?
                .ok_or_else(|| Error::UserNotFound(user.clone()))?;
            let previous_sponsor = record.sponsor_id.take();
            store.put_user(&record).await?;
            let event = NetworkEvent::Responsored {
                user: user.clone(),
                previous_sponsor,
            };
            apply(service, &event, &mut out).await?;
        }

        Command::Remove { user } => {
            let record = store
                .remove_user(user)
                .await
                .ok_or_else(|| Error::UserNotFound(user.clone()))?;
            let event = NetworkEvent::Removed {
                user: user.clone(),
                previous_sponsor: record.sponsor_id,
            };
            apply(service, &event, &mut out).await?;
        }

        Command::List => {
            let records = store.records().await;
            if records.is_empty() {
                let _ = writeln!(out, "(none)");
            }
            for record in records {
                let sponsor = record
                    .sponsor_id
                    .as_ref()
                    .map(UserId::as_str)
                    .unwrap_or("-");
                let _ = writeln!(
                    out,
                    "{}\tsponsor={}\trank={}\trole={:?}",
                    record.id, sponsor, record.rank, record.role
                );
            }
        }
    }

    Ok(out)
}

async fn apply(
    service: &RankService<MemoryStore>,
    event: &NetworkEvent,
    out: &mut String,
) -> Result<()> {
    for report in service.apply(event).await? {
        for change in &report.updated {
            let _ = writeln!(out, "{}: {} -> {}", change.user, change.previous, change.rank);
        }
    }
    Ok(())
}

fn describe_stop(stop: &WalkStop) -> String {
    match stop {
        WalkStop::Root => "reached root".to_string(),
        WalkStop::Cycle(id) => format!("sponsor cycle at {}", id),
        WalkStop::HopLimit => "hop limit".to_string(),
        WalkStop::MissingUser(id) => format!("unknown user {}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_rank_with_flags() {
        let inv = parse_args(
            &args(&["rank", "alice", "--no-cache", "--snapshot", "net.json"]),
            None,
        )
        .unwrap();
        assert_eq!(inv.snapshot, PathBuf::from("net.json"));
        assert_eq!(
            inv.command,
            Command::Rank {
                user: "alice".into(),
                use_cache: false
            }
        );
    }

    #[test]
    fn env_snapshot_is_default_path() {
        let inv = parse_args(&args(&["list"]), Some("/tmp/env.json".into())).unwrap();
        assert_eq!(inv.snapshot, PathBuf::from("/tmp/env.json"));

        let inv = parse_args(&args(&["list"]), None).unwrap();
        assert_eq!(inv.snapshot, PathBuf::from(DEFAULT_SNAPSHOT));
    }

    #[test]
    fn parse_errors() {
        assert!(parse_args(&args(&[]), None).is_err());
        assert!(parse_args(&args(&["link", "a"]), None).is_err());
        assert!(parse_args(&args(&["frobnicate"]), None).is_err());
        assert!(parse_args(&args(&["list", "--snapshot"]), None).is_err());
    }

    async fn invoke(path: &Path, list: &[&str]) -> Result<String> {
        let mut argv = args(list);
        argv.push("--snapshot".into());
        argv.push(path.display().to_string());
        let inv = parse_args(&argv, None).unwrap();
        run(&inv, EngineConfig::default()).await
    }

    #[tokio::test]
    async fn build_network_and_read_ranks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("net.json");

        invoke(&path, &["link", "b", "a"]).await.unwrap();
        invoke(&path, &["link", "c", "b"]).await.unwrap();

        // "a" was never created as a record, so rank reads still work from the map
        assert_eq!(invoke(&path, &["rank", "a"]).await.unwrap().trim(), "2");
        assert_eq!(invoke(&path, &["rank", "b"]).await.unwrap().trim(), "1");

        let snapshot = StoreSnapshot::read_from(&path).unwrap();
        let b = snapshot.users.iter().find(|u| u.id.as_str() == "b").unwrap();
        assert_eq!(b.rank, 1);
        assert_eq!(snapshot.cache.get("rank:a").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn relink_moves_subtree() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("net.json");
        StoreSnapshot {
            users: vec![
                UserRecord::new("a"),
                UserRecord::sponsored_by("b", "a"),
                UserRecord::sponsored_by("c", "b"),
                UserRecord::new("r"),
            ],
            ..StoreSnapshot::default()
        }
        .write_to(&path)
        .unwrap();

        invoke(&path, &["recompute-all"]).await.unwrap();
        let out = invoke(&path, &["link", "c", "r"]).await.unwrap();
        assert!(out.contains("r: 0 -> 1"));
        assert!(out.contains("a: 2 -> 1"));

        let out = invoke(&path, &["unlink", "c"]).await.unwrap();
        assert!(out.contains("r: 1 -> 0"));
    }

    #[tokio::test]
    async fn remove_and_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("net.json");

        invoke(&path, &["link", "b", "a"]).await.unwrap();
        invoke(&path, &["remove", "b"]).await.unwrap();

        let listing = invoke(&path, &["list"]).await.unwrap();
        assert_eq!(listing.trim(), "(none)");

        let err = invoke(&path, &["remove", "b"]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn self_link_rejected() {
        assert!(parse_args(&args(&["link", "a", "a"]), None).is_err());
    }

    #[test]
    fn stop_descriptions() {
        assert_eq!(describe_stop(&WalkStop::Root), "reached root");
        assert_eq!(
            describe_stop(&WalkStop::Cycle("x".into())),
            "sponsor cycle at x"
        );
    }
}
