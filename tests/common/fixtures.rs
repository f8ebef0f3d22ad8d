//! Simulation store fixtures

use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{params, Connection};
use tempfile::TempDir;
use tiered_archive::{cold_path_for, ArchivalPolicy, Classification, Config, TieredStore};

pub const SEASONS: i64 = 9;
pub const ROUNDS: i64 = 3;
pub const DRIVERS: i64 = 4;
pub const ROWS_PER_SEASON: u64 = (ROUNDS * DRIVERS) as u64;

const SCHEMA: &str = "
    CREATE TABLE game_state (key TEXT PRIMARY KEY, value TEXT NOT NULL);
    CREATE TABLE teams (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE drivers (
        id INTEGER PRIMARY KEY,
        team_id INTEGER NOT NULL REFERENCES teams(id),
        name TEXT NOT NULL
    );
    CREATE TABLE career_stats (
        driver_id INTEGER PRIMARY KEY REFERENCES drivers(id),
        wins INTEGER NOT NULL DEFAULT 0,
        points REAL NOT NULL DEFAULT 0
    );
    CREATE TABLE race_results (
        season INTEGER NOT NULL,
        round INTEGER NOT NULL,
        driver_id INTEGER NOT NULL REFERENCES drivers(id),
        position INTEGER NOT NULL,
        points REAL NOT NULL,
        PRIMARY KEY (season, round, driver_id)
    );
    CREATE INDEX idx_race_results_driver ON race_results(driver_id);
    CREATE TABLE event_log (
        id INTEGER PRIMARY KEY,
        tick INTEGER NOT NULL,
        kind TEXT NOT NULL,
        payload TEXT
    );
    CREATE INDEX idx_event_log_tick ON event_log(tick);
";

/// Hot store on disk, removed with the temp directory
pub struct SimulationFixture {
    pub dir: TempDir,
    pub path: PathBuf,
    pub ticks: i64,
}

impl SimulationFixture {
    /// 9 seasons of race results and `ticks` event-log rows (one per tick)
    pub fn new(ticks: i64) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("league.db");
        let conn = Connection::open(&path).expect("Failed to create hot store");
        conn.execute_batch(SCHEMA).expect("Failed to create schema");
        seed(&conn, ticks);
        Self { dir, path, ticks }
    }

    pub fn cold_path(&self) -> PathBuf {
        cold_path_for(&self.path)
    }

    pub fn open(&self, policy: ArchivalPolicy) -> TieredStore {
        TieredStore::open(&self.path, Classification::simulation(), policy)
            .expect("Failed to open tiered store")
    }

    pub fn config(&self, policy: ArchivalPolicy) -> Config {
        Config {
            policy,
            ..Default::default()
        }
    }

    pub fn hot_conn(&self) -> Connection {
        Connection::open(&self.path).expect("Failed to open hot store")
    }

    pub fn hot_count(&self, table: &str) -> u64 {
        count(&self.path, table)
    }

    pub fn cold_count(&self, table: &str) -> u64 {
        count(&self.cold_path(), table)
    }

    /// Every row of `table` in hot, ordered by rowid or primary key
    pub fn hot_snapshot(&self, table: &str) -> Vec<Vec<Value>> {
        snapshot(&self.path, table, "1")
    }

    pub fn hot_season(&self, season: i64) -> Vec<Vec<Value>> {
        snapshot(&self.path, "race_results", &format!("season = {}", season))
    }

    pub fn cold_season(&self, season: i64) -> Vec<Vec<Value>> {
        snapshot(&self.cold_path(), "race_results", &format!("season = {}", season))
    }
}

/// Window policy without compaction (keeps tests fast)
pub fn window_policy(epoch_window: i64, sequence_window: i64) -> ArchivalPolicy {
    ArchivalPolicy {
        hot_epoch_window: epoch_window,
        hot_sequence_window: sequence_window,
        compact_after_run: false,
        ..Default::default()
    }
}

fn seed(conn: &Connection, ticks: i64) {
    conn.execute_batch(
        "INSERT INTO teams VALUES (1, 'Falcon'), (2, 'Meridian');
         INSERT INTO drivers VALUES (1, 1, 'Ada'), (2, 1, 'Brook'), (3, 2, 'Cass'), (4, 2, 'Dev');
         INSERT INTO career_stats (driver_id, wins, points)
             VALUES (1, 12, 640.5), (2, 7, 511.0), (3, 5, 402.0), (4, 3, 298.5);",
    )
    .expect("Failed to seed entities");
    conn.execute(
        "INSERT INTO game_state VALUES ('season', ?1), ('tick', ?2)",
        params![SEASONS.to_string(), ticks.to_string()],
    )
    .expect("Failed to seed game state");

    let points = [25.0, 18.0, 15.0, 12.0];
    for season in 1..=SEASONS {
        for round in 1..=ROUNDS {
            for driver in 1..=DRIVERS {
                let position = (driver + round + season) % DRIVERS + 1;
                conn.execute(
                    "INSERT INTO race_results VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![season, round, driver, position, points[(position - 1) as usize]],
                )
                .expect("Failed to seed race results");
            }
        }
    }

    for tick in 1..=ticks {
        conn.execute(
            "INSERT INTO event_log (tick, kind, payload) VALUES (?1, 'lap', ?2)",
            params![tick, format!("tick {}", tick)],
        )
        .expect("Failed to seed event log");
    }
}

fn count(path: &Path, table: &str) -> u64 {
    let conn = Connection::open(path).expect("Failed to open store");
    let n: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .expect("Failed to count rows");
    n as u64
}

fn snapshot(path: &Path, table: &str, filter: &str) -> Vec<Vec<Value>> {
    let conn = Connection::open(path).expect("Failed to open store");
    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {} WHERE {} ORDER BY 1, 2, 3", table, filter))
        .expect("Failed to prepare snapshot");
    let width = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            (0..width).map(|i| row.get::<_, Value>(i)).collect::<Result<Vec<_>, _>>()
        })
        .expect("Failed to read snapshot");
    rows.collect::<Result<Vec<_>, _>>()
        .expect("Failed to collect snapshot")
}
