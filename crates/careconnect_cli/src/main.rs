//! Operator CLI over a guardianship database.
//!
//! # Responsibility
//! - Provide read-only inspection of child/guardian relationships.
//! - Keep output line-oriented and deterministic for scripting.

use careconnect_core::{
    open_db_with_options, ChildId, CoreConfig, GuardianId, GuardianshipQuery,
    SqliteChildRepository, SqliteGuardianRepository, SqliteRelationshipRepository,
};
use clap::{Args, Parser, Subcommand};
use log::info;
use rusqlite::Connection;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "careconnect", version, about = "Inspect CareConnect guardianship data")]
struct Cli {
    /// JSON config file (db path, logging, busy timeout).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the core library is linked.
    Ping,
    /// Open (and migrate) the database, then print its schema version.
    Schema(DbArgs),
    /// List a child's guardians in assignment order.
    Guardians {
        #[command(flatten)]
        db: DbArgs,
        #[arg(long)]
        child: ChildId,
    },
    /// List the children a guardian is linked to.
    Children {
        #[command(flatten)]
        db: DbArgs,
        #[arg(long)]
        guardian: GuardianId,
    },
    /// Print a child's primary guardian, or `none`.
    Primary {
        #[command(flatten)]
        db: DbArgs,
        #[arg(long)]
        child: ChildId,
    },
}

#[derive(Debug, Args)]
struct DbArgs {
    /// Database file; overrides `db_path` from the config file.
    #[arg(long)]
    db: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match cli.config.as_deref() {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    careconnect_core::init_from_config(&config)?;

    match cli.command {
        Command::Ping => {
            println!("careconnect_core ping={}", careconnect_core::ping());
            println!("careconnect_core version={}", careconnect_core::core_version());
        }
        Command::Schema(db) => {
            let conn = open(&config, &db)?;
            let version = careconnect_core::db::migrations::current_user_version(&conn)?;
            println!("schema_version={version}");
        }
        Command::Guardians { db, child } => {
            let conn = open(&config, &db)?;
            let query = query(&conn)?;
            let primary = query.primary_guardian_id(child)?;
            for guardian in query.guardians_for_child(child)? {
                println!(
                    "{}\tuser={}\trelationship={}\tprimary={}\tpickup={}",
                    guardian.id,
                    guardian.user_id,
                    guardian.relationship,
                    primary == Some(guardian.id),
                    guardian.pickup_authorized
                );
            }
        }
        Command::Children { db, guardian } => {
            let conn = open(&config, &db)?;
            for child in query(&conn)?.children_for_guardian(guardian)? {
                println!("{}\t{}", child.id, child.full_name());
            }
        }
        Command::Primary { db, child } => {
            let conn = open(&config, &db)?;
            match query(&conn)?.primary_guardian_id(child)? {
                Some(guardian_id) => println!("{guardian_id}"),
                None => println!("none"),
            }
        }
    }
    Ok(())
}

fn open(config: &CoreConfig, args: &DbArgs) -> Result<Connection, Box<dyn Error>> {
    let path = args
        .db
        .clone()
        .or_else(|| config.db_path.clone())
        .ok_or("no database given; pass --db or set db_path in --config")?;
    info!("event=cli_open module=cli status=start");
    Ok(open_db_with_options(path, config.db_options())?)
}

type SqliteQuery<'conn> = GuardianshipQuery<
    SqliteRelationshipRepository<'conn>,
    SqliteGuardianRepository<'conn>,
    SqliteChildRepository<'conn>,
>;

fn query(conn: &Connection) -> Result<SqliteQuery<'_>, Box<dyn Error>> {
    Ok(GuardianshipQuery::new(
        SqliteRelationshipRepository::try_new(conn)?,
        SqliteGuardianRepository::try_new(conn)?,
        SqliteChildRepository::try_new(conn)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn guardians_requires_child_uuid() {
        assert!(Cli::try_parse_from(["careconnect", "guardians", "--child", "nope"]).is_err());
        let child = uuid::Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["careconnect", "guardians", "--db", "x.db", "--child", &child])
            .unwrap();
        assert!(matches!(cli.command, Command::Guardians { .. }));
    }
}
