//! lot_admin - manage the lot catalog and inspect stored snapshots

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::Path;

use lot_occupancy::ingest::is_synthetic_path;
use lot_occupancy::storage::{LotRecord, LotStore, NewLot, SqliteLotStore, StatusSnapshot};
use lot_occupancy::ui::format_tally;
use lot_occupancy::zone::{build_geometries, load_zone_file};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the occupancy database.
    #[arg(long, env = "OCCUPANCY_DB_PATH", default_value = "occupancy.db")]
    db_path: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a lot after checking its video and zone file.
    Add {
        #[arg(long)]
        name: String,
        /// Local video file (or stub:// url for testing).
        #[arg(long)]
        video: String,
        /// Zone file (JSON array or TOML with [[zones]]).
        #[arg(long)]
        zones: String,
        /// Frame offset playback starts from, and rewinds to.
        #[arg(long, default_value_t = 1)]
        start_frame: u64,
        /// Register without starting it in the daemon.
        #[arg(long)]
        inactive: bool,
    },
    /// List lots.
    List {
        /// Only active lots.
        #[arg(long)]
        active: bool,
    },
    /// Show one lot and its latest snapshot.
    Show {
        id: String,
        /// Include the per-zone statuses.
        #[arg(long)]
        raw: bool,
    },
    /// Mark a lot active (started by the daemon on its next start).
    Activate { id: String },
    /// Mark a lot inactive.
    Deactivate { id: String },
    /// Latest counts of every active lot.
    Status,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let mut store = SqliteLotStore::open(&args.db_path)?;

    match args.command {
        Command::Add {
            name,
            video,
            zones,
            start_frame,
            inactive,
        } => {
            if !is_synthetic_path(&video) && !Path::new(&video).exists() {
                return Err(anyhow!("video file {} does not exist", video));
            }
            let definitions = load_zone_file(Path::new(&zones))?;
            let geometries = build_geometries(&definitions)?;
            let lot = store.create_lot(NewLot {
                start_frame,
                ..NewLot::new(name, video, zones)
            })?;
            if inactive {
                store.set_active(&lot.id, false)?;
            }
            println!("{}", lot.id);
            eprintln!("registered '{}' with {} zones", lot.name, geometries.len());
        }
        Command::List { active } => {
            for lot in store.list_lots(active)? {
                print_lot(&lot);
            }
        }
        Command::Show { id, raw } => {
            let lot = store
                .lot(&id)?
                .ok_or_else(|| anyhow!("unknown lot {}", id))?;
            print_lot(&lot);
            println!("  video:  {}", lot.video_path);
            println!("  zones:  {}", lot.zones_path);
            println!("  start:  frame {}", lot.start_frame);
            match store.latest_snapshot(&lot.id)? {
                Some(snapshot) => print_snapshot(&snapshot, raw)?,
                None => println!("  no snapshots yet"),
            }
        }
        Command::Activate { id } => set_active(&mut store, &id, true)?,
        Command::Deactivate { id } => set_active(&mut store, &id, false)?,
        Command::Status => {
            for (lot, snapshot) in store.latest_snapshots()? {
                match snapshot {
                    Some(snapshot) => println!(
                        "{}  {}  {}",
                        lot.id,
                        lot.name,
                        format_tally(&snapshot.tally())
                    ),
                    None => println!("{}  {}  no snapshots yet", lot.id, lot.name),
                }
            }
        }
    }
    Ok(())
}

fn set_active(store: &mut SqliteLotStore, id: &str, active: bool) -> Result<()> {
    if !store.set_active(id, active)? {
        return Err(anyhow!("unknown lot {}", id));
    }
    println!("{} {}", id, if active { "activated" } else { "deactivated" });
    Ok(())
}

fn print_lot(lot: &LotRecord) {
    println!(
        "{}  {}  {}",
        lot.id,
        lot.name,
        if lot.is_active { "active" } else { "inactive" }
    );
}

fn print_snapshot(snapshot: &StatusSnapshot, raw: bool) -> Result<()> {
    println!(
        "  latest: {} (at {})",
        format_tally(&snapshot.tally()),
        snapshot.captured_at
    );
    if raw {
        println!("  raw:    {}", serde_json::to_string(&snapshot.raw_statuses)?);
    }
    Ok(())
}
