//! Spreadsheet import.
//!
//! The workbook is flattened to string cells first so the conversion rules
//! live in [`games_from_rows`] and can be exercised without a file.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use crate::{
    error::ImportError,
    models::{Game, GameStatus},
    timefmt::{format_hms, from_excel_serial, parse_date, parse_hms, parse_timestamp},
};

/// An `x` crosses a game out; any other cell in an Owned column, blank
/// included, means the game is owned.
const NOT_OWNED_MARKERS: [&str; 6] = ["x", "❌", "no", "n", "false", "0"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Name,
    ReleaseDate,
    Platform,
    Time,
    Status,
    Owned,
    LastPlayed,
}

impl Column {
    fn from_header(header: &str) -> Option<Self> {
        match header.trim().to_lowercase().as_str() {
            "name" | "game" => Some(Self::Name),
            "release date" | "release" | "released" => Some(Self::ReleaseDate),
            "platform" => Some(Self::Platform),
            "time" | "time played" | "playtime" => Some(Self::Time),
            "status" => Some(Self::Status),
            "owned" | "ownership" => Some(Self::Owned),
            "last played" | "last tracked" => Some(Self::LastPlayed),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct ColumnMap {
    name: usize,
    release_date: Option<usize>,
    platform: Option<usize>,
    time: Option<usize>,
    status: Option<usize>,
    owned: Option<usize>,
    last_played: Option<usize>,
}

impl ColumnMap {
    fn from_header(cells: &[String]) -> Result<Self, ImportError> {
        let mut name = None;
        let mut map = Self::default();
        for (index, cell) in cells.iter().enumerate() {
            let slot = match Column::from_header(cell) {
                Some(Column::Name) => {
                    name.get_or_insert(index);
                    continue;
                }
                Some(Column::ReleaseDate) => &mut map.release_date,
                Some(Column::Platform) => &mut map.platform,
                Some(Column::Time) => &mut map.time,
                Some(Column::Status) => &mut map.status,
                Some(Column::Owned) => &mut map.owned,
                Some(Column::LastPlayed) => &mut map.last_played,
                None => continue,
            };
            slot.get_or_insert(index);
        }
        map.name = name.ok_or(ImportError::MissingColumn("Name"))?;
        Ok(map)
    }
}

/// Read the first worksheet of an `.xlsx`/`.xls`/`.ods` file into games.
pub fn import_workbook(path: impl AsRef<Path>) -> Result<Vec<Game>, ImportError> {
    let path = path.as_ref();
    let workbook_error = |reason: String| ImportError::Workbook {
        path: path.to_path_buf(),
        reason,
    };

    let mut workbook = open_workbook_auto(path).map_err(|err| workbook_error(err.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::EmptyWorkbook)?
        .map_err(|err| workbook_error(err.to_string()))?;

    // Leading empty rows and columns are trimmed by calamine; keep sheet row
    // numbers meaningful in error messages by padding them back.
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let mut rows: Vec<Vec<String>> = vec![Vec::new(); first_row];
    rows.extend(
        range
            .rows()
            .map(|row| row.iter().map(cell_text).collect::<Vec<_>>()),
    );

    let games = games_from_rows(&rows)?;
    info!(path = %path.display(), games = games.len(), "Workbook imported");
    Ok(games)
}

/// Convert sheet rows into games. Row numbers in errors are one-based.
pub fn games_from_rows(rows: &[Vec<String>]) -> Result<Vec<Game>, ImportError> {
    let header_index = rows
        .iter()
        .position(|row| {
            row.iter()
                .any(|cell| Column::from_header(cell) == Some(Column::Name))
        })
        .ok_or_else(|| {
            if rows.iter().all(|row| row.iter().all(|cell| cell.trim().is_empty())) {
                ImportError::EmptyWorkbook
            } else {
                ImportError::MissingHeader
            }
        })?;
    let columns = ColumnMap::from_header(&rows[header_index])?;
    debug!(?columns, header_row = header_index + 1, "Import header located");

    let mut games = Vec::new();
    for (index, row) in rows.iter().enumerate().skip(header_index + 1) {
        let row_number = index + 1;
        let cell = |column: Option<usize>| {
            column
                .and_then(|column| row.get(column))
                .map_or("", |value| value.trim())
        };

        let name = cell(Some(columns.name));
        if name.is_empty() {
            continue;
        }

        let mut game = Game::new(name);
        game.platform = cell(columns.platform).to_string();
        game.release_date = parse_date_cell(row_number, cell(columns.release_date))?;
        game.status = parse_status(row_number, cell(columns.status))?;
        game.owned = columns.owned.is_some_and(|_| is_owned(cell(columns.owned)));
        game.baseline_secs = parse_hms(cell(columns.time))
            .ok_or_else(|| ImportError::InvalidTime {
                row: row_number,
                value: cell(columns.time).to_string(),
            })?
            .as_secs();
        game.last_played = parse_timestamp_cell(row_number, cell(columns.last_played))?;
        games.push(game);
    }
    Ok(games)
}

fn parse_status(row: usize, value: &str) -> Result<GameStatus, ImportError> {
    if value.is_empty() {
        return Ok(GameStatus::Pending);
    }
    value.parse().map_err(|_| ImportError::InvalidStatus {
        row,
        value: value.to_string(),
    })
}

fn is_owned(value: &str) -> bool {
    let lowered = value.to_lowercase();
    !NOT_OWNED_MARKERS.contains(&lowered.as_str())
}

fn is_absent(value: &str) -> bool {
    value.is_empty() || value == "-"
}

fn parse_date_cell(row: usize, value: &str) -> Result<Option<NaiveDate>, ImportError> {
    if is_absent(value) {
        return Ok(None);
    }
    parse_date(value)
        .or_else(|| {
            value
                .parse::<f64>()
                .ok()
                .and_then(from_excel_serial)
                .map(|datetime| datetime.date())
        })
        .map(Some)
        .ok_or_else(|| ImportError::InvalidDate {
            row,
            value: value.to_string(),
        })
}

fn parse_timestamp_cell(row: usize, value: &str) -> Result<Option<DateTime<Utc>>, ImportError> {
    if is_absent(value) {
        return Ok(None);
    }
    let serial = || {
        let naive = from_excel_serial(value.parse::<f64>().ok()?)?;
        parse_timestamp(&naive.format("%Y-%m-%d %H:%M:%S").to_string())
    };
    parse_timestamp(value)
        .or_else(serial)
        .map(Some)
        .ok_or_else(|| ImportError::InvalidDate {
            row,
            value: value.to_string(),
        })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => text.clone(),
        Data::Int(value) => value.to_string(),
        Data::Float(value) if value.fract() == 0.0 => format!("{value:.0}"),
        Data::Float(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTime(value) if value.is_duration() => {
            let secs = (value.as_f64() * 86_400.0).round().max(0.0) as u64;
            format_hms(std::time::Duration::from_secs(secs))
        }
        Data::DateTime(value) => from_excel_serial(value.as_f64())
            .map(|datetime| datetime.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use rust_xlsxwriter::{Format, Workbook};

    fn rows(table: &[&[&str]]) -> Vec<Vec<String>> {
        table
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn header_is_found_below_title_rows() {
        let sheet = rows(&[
            &["My games"],
            &[],
            &["", "Name", "Release Date", "Platform", "Time", "Status", "Owned", "Last Played"],
            &["", "Hades", "2020-09-17", "PC", "12:30:00", "Completed", "✅", "2024-03-01 20:15:00"],
            &["", "", "", "", "", "", "", ""],
            &["", "Celeste", "-", "Switch", "", "in_progress", "", "-"],
        ]);
        let games = games_from_rows(&sheet).unwrap();
        assert_eq!(games.len(), 2);

        let hades = &games[0];
        assert_eq!(hades.release_date, NaiveDate::from_ymd_opt(2020, 9, 17));
        assert_eq!(hades.baseline_secs, 12 * 3600 + 30 * 60);
        assert_eq!(hades.status, GameStatus::Completed);
        assert!(hades.owned);
        assert!(hades.last_played.is_some());

        let celeste = &games[1];
        assert_eq!(celeste.release_date, None);
        assert_eq!(celeste.status, GameStatus::InProgress);
        assert!(celeste.owned);
        assert_eq!(celeste.last_played, None);
    }

    #[test]
    fn missing_status_column_defaults_to_pending() {
        let sheet = rows(&[&["Name", "Platform"], &["Tetris", "GB"], &["Doom", "PC"]]);
        let games = games_from_rows(&sheet).unwrap();
        assert!(games.iter().all(|game| game.status == GameStatus::Pending));
        assert!(games.iter().all(|game| game.baseline_secs == 0 && !game.owned));
    }

    #[test]
    fn crossed_out_games_are_not_owned() {
        let sheet = rows(&[
            &["Name", "Owned"],
            &["Hades", "x"],
            &["Celeste", ""],
            &["Okami", "X"],
            &["Doom", "✅"],
            &["Tetris", "no"],
            &["Outer Wilds"],
        ]);
        let owned: Vec<(String, bool)> = games_from_rows(&sheet)
            .unwrap()
            .into_iter()
            .map(|game| (game.name, game.owned))
            .collect();
        assert_eq!(
            owned,
            vec![
                ("Hades".to_string(), false),
                ("Celeste".to_string(), true),
                ("Okami".to_string(), false),
                ("Doom".to_string(), true),
                ("Tetris".to_string(), false),
                ("Outer Wilds".to_string(), true),
            ]
        );
    }

    #[test]
    fn rejects_bad_cells_with_row_numbers() {
        let bad_status = rows(&[&["Name", "Status"], &["Hades", "Abandoned"]]);
        assert!(matches!(
            games_from_rows(&bad_status),
            Err(ImportError::InvalidStatus { row: 2, .. })
        ));

        let bad_time = rows(&[&["Name", "Time"], &["Hades", "a while"]]);
        assert!(matches!(
            games_from_rows(&bad_time),
            Err(ImportError::InvalidTime { row: 2, .. })
        ));

        let bad_date = rows(&[&["Name", "Release Date"], &["Hades", "someday"]]);
        assert!(matches!(
            games_from_rows(&bad_date),
            Err(ImportError::InvalidDate { row: 2, .. })
        ));
    }

    #[test]
    fn sheet_without_name_header_is_rejected() {
        assert!(matches!(
            games_from_rows(&rows(&[&["Title", "Status"], &["Hades", "Pending"]])),
            Err(ImportError::MissingHeader)
        ));
        assert!(matches!(games_from_rows(&[]), Err(ImportError::EmptyWorkbook)));
    }

    #[test]
    fn excel_serial_dates_are_accepted() {
        let sheet = rows(&[&["Name", "Release Date"], &["Hades", "44091"]]);
        let games = games_from_rows(&sheet).unwrap();
        assert_eq!(games[0].release_date, NaiveDate::from_ymd_opt(2020, 9, 17));
    }

    #[test]
    fn reads_generated_workbook() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("games.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let time_format = Format::new().set_num_format("[h]:mm:ss");
        sheet.write_string(0, 1, "Game backlog")?;
        for (col, header) in ["Name", "Release Date", "Platform", "Time", "Owned"]
            .into_iter()
            .enumerate()
        {
            sheet.write_string(4, col as u16 + 1, header)?;
        }
        sheet.write_string(5, 1, "Hades")?;
        sheet.write_number_with_format(5, 2, 44091.0, &date_format)?;
        sheet.write_string(5, 3, "PC")?;
        sheet.write_string(5, 4, "03:15:00")?;
        sheet.write_string(5, 5, "yes")?;
        sheet.write_string(6, 1, "Outer Wilds")?;
        sheet.write_string(6, 3, "PC")?;
        sheet.write_number_with_format(6, 4, 0.25, &time_format)?;
        workbook.save(&path)?;

        let games = import_workbook(&path)?;
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].name, "Hades");
        assert_eq!(games[0].release_date, NaiveDate::from_ymd_opt(2020, 9, 17));
        assert_eq!(games[0].baseline_secs, 3 * 3600 + 15 * 60);
        assert!(games[0].owned);
        assert_eq!(games[1].baseline_secs, 6 * 3600);
        assert_eq!(games[1].status, GameStatus::Pending);
        Ok(())
    }

    #[test]
    fn unreadable_file_is_a_workbook_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(
            import_workbook(&path),
            Err(ImportError::Workbook { .. })
        ));
    }
}
