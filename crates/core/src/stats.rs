//! Read-only aggregation over a [`Store`] for the statistics screen and the
//! `--stats` summary.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use chrono::{Datelike, Local, NaiveDate, TimeZone};

use crate::{
    models::{Game, GameStatus, Session, Stars, Tag},
    store::Store,
};

const TOP_TAGS: usize = 5;

/// Number of games per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// Games not started.
    pub pending: usize,
    /// Games being played.
    pub in_progress: usize,
    /// Finished games.
    pub completed: usize,
}

impl StatusCounts {
    /// Count for one status.
    pub fn get(&self, status: GameStatus) -> usize {
        match status {
            GameStatus::Pending => self.pending,
            GameStatus::InProgress => self.in_progress,
            GameStatus::Completed => self.completed,
        }
    }

    fn bump(&mut self, status: GameStatus) {
        match status {
            GameStatus::Pending => self.pending += 1,
            GameStatus::InProgress => self.in_progress += 1,
            GameStatus::Completed => self.completed += 1,
        }
    }
}

/// Sessions started on one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayActivity {
    /// Local calendar date.
    pub date: NaiveDate,
    /// Sessions started that day.
    pub sessions: usize,
    /// Their combined elapsed time.
    pub playtime: Duration,
}

/// Completed versus open games released in one year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearBreakdown {
    /// `None` groups games without a release date.
    pub year: Option<i32>,
    /// Completed games from that year.
    pub completed: usize,
    /// Pending or in-progress games from that year.
    pub open: usize,
}

impl YearBreakdown {
    /// The year, or `Unknown`.
    pub fn label(&self) -> String {
        self.year
            .map_or_else(|| "Unknown".to_string(), |year| year.to_string())
    }
}

/// Count of ratings per star value, index 0 holding one-star ratings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatingDistribution(pub [usize; 5]);

impl RatingDistribution {
    fn add(&mut self, stars: Stars) {
        self.0[usize::from(stars.get()) - 1] += 1;
    }

    /// Number of ratings counted.
    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }
}

/// Session-rating digest of one game.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRatingSummary {
    /// Game name.
    pub game: String,
    /// Duration-weighted mean, rounded to one decimal.
    pub weighted_average: f64,
    /// Sessions carrying a rating.
    pub rated_sessions: usize,
    /// Most frequent session tags, at most five.
    pub top_tags: Vec<Tag>,
}

/// Everything the statistics view shows.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryStats {
    /// Games in the library.
    pub total_games: usize,
    /// Games per status.
    pub status: StatusCounts,
    /// Share of completed games, 0 to 100.
    pub completion_pct: f64,
    /// Owned games.
    pub owned: usize,
    /// Baseline plus session time over all games.
    pub total_playtime: Duration,
    /// Total playtime divided by the number of games.
    pub average_playtime: Duration,
    /// Games with any playtime, longest first.
    pub playtime_by_game: Vec<(String, Duration)>,
    /// Recorded sessions.
    pub session_count: usize,
    /// Elapsed time of all sessions.
    pub session_time: Duration,
    /// Mean session length.
    pub average_session: Duration,
    /// Ordered by date.
    pub daily: Vec<DayActivity>,
    /// Day with the most sessions; the earliest wins ties.
    pub most_active_day: Option<DayActivity>,
    /// Overall game ratings per star value.
    pub game_ratings: RatingDistribution,
    /// Session ratings per star value.
    pub session_ratings: RatingDistribution,
    /// Known years ascending, then `Unknown`.
    pub release_years: Vec<YearBreakdown>,
    /// One digest per game with rated sessions.
    pub session_rating_summaries: Vec<SessionRatingSummary>,
}

impl LibraryStats {
    /// Aggregate using the local time zone for per-day grouping.
    pub fn compute(store: &Store) -> Self {
        Self::compute_in(store, &Local)
    }

    /// Aggregate, grouping sessions into days of `zone`.
    pub fn compute_in<Tz: TimeZone>(store: &Store, zone: &Tz) -> Self {
        let games = &store.games;
        let total_games = games.len();

        let mut status = StatusCounts::default();
        let mut game_ratings = RatingDistribution::default();
        let mut session_ratings = RatingDistribution::default();
        let mut days: BTreeMap<NaiveDate, (usize, Duration)> = BTreeMap::new();
        let mut years: BTreeMap<Option<i32>, (usize, usize)> = BTreeMap::new();
        let mut playtime_by_game = Vec::new();
        let mut total_playtime = Duration::ZERO;
        let mut session_count = 0;
        let mut session_time = Duration::ZERO;

        for game in games {
            status.bump(game.status);
            if let Some(rating) = &game.rating {
                game_ratings.add(rating.stars);
            }

            let year = years
                .entry(game.release_date.map(|date| date.year()))
                .or_default();
            if game.status == GameStatus::Completed {
                year.0 += 1;
            } else {
                year.1 += 1;
            }

            let playtime = game.total_playtime();
            total_playtime += playtime;
            if !playtime.is_zero() {
                playtime_by_game.push((game.name.clone(), playtime));
            }

            for session in &game.sessions {
                session_count += 1;
                session_time += session.elapsed();
                if let Some(stars) = session.stars() {
                    session_ratings.add(stars);
                }
                let date = session.start.with_timezone(zone).date_naive();
                let day = days.entry(date).or_default();
                day.0 += 1;
                day.1 += session.elapsed();
            }
        }

        playtime_by_game.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let daily: Vec<DayActivity> = days
            .into_iter()
            .map(|(date, (sessions, playtime))| DayActivity {
                date,
                sessions,
                playtime,
            })
            .collect();
        // Earliest day wins ties.
        let most_active_day = daily.iter().copied().reduce(|best, day| {
            if (day.sessions, day.playtime) > (best.sessions, best.playtime) {
                day
            } else {
                best
            }
        });

        // BTreeMap orders `None` first; the unknown bucket belongs last.
        let mut release_years: Vec<YearBreakdown> = years
            .into_iter()
            .map(|(year, (completed, open))| YearBreakdown {
                year,
                completed,
                open,
            })
            .collect();
        if release_years.first().is_some_and(|entry| entry.year.is_none()) {
            release_years.rotate_left(1);
        }

        Self {
            total_games,
            status,
            completion_pct: percentage(status.completed, total_games),
            owned: games.iter().filter(|game| game.owned).count(),
            total_playtime,
            average_playtime: average(total_playtime, total_games),
            playtime_by_game,
            session_count,
            session_time,
            average_session: average(session_time, session_count),
            daily,
            most_active_day,
            game_ratings,
            session_ratings,
            release_years,
            session_rating_summaries: games.iter().filter_map(session_rating_summary).collect(),
        }
    }
}

/// Weighted session rating and most frequent tags of a game, `None` when no
/// session carries a rating.
pub fn session_rating_summary(game: &Game) -> Option<SessionRatingSummary> {
    let rated: Vec<&Session> = game
        .sessions
        .iter()
        .filter(|session| session.stars().is_some())
        .collect();
    if rated.is_empty() {
        return None;
    }

    let (weighted_sum, total_weight) =
        rated
            .iter()
            .fold((0.0, 0.0), |(sum, weights), session| {
                let stars = session.stars().map_or(0, Stars::get);
                let weight = session_weight(session);
                (sum + f64::from(stars) * weight, weights + weight)
            });

    let mut tag_counts: HashMap<Tag, usize> = HashMap::new();
    for rating in rated
        .iter()
        .filter_map(|session| session.feedback.as_ref()?.rating.as_ref())
    {
        for tag in &rating.tags {
            *tag_counts.entry(*tag).or_default() += 1;
        }
    }
    let mut tags: Vec<(Tag, usize)> = tag_counts.into_iter().collect();
    tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Some(SessionRatingSummary {
        game: game.name.clone(),
        weighted_average: (weighted_sum / total_weight * 10.0).round() / 10.0,
        rated_sessions: rated.len(),
        top_tags: tags.into_iter().take(TOP_TAGS).map(|(tag, _)| tag).collect(),
    })
}

/// Longer sessions count more: one unit per half hour, never below one.
fn session_weight(session: &Session) -> f64 {
    (session.elapsed().as_secs_f64() / 60.0 / 30.0).max(1.0)
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn average(total: Duration, count: usize) -> Duration {
    match u32::try_from(count) {
        Ok(0) | Err(_) => Duration::ZERO,
        Ok(count) => total / count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Feedback, Rating};
    use chrono::{DateTime, FixedOffset, Utc};

    fn session(start: &str, minutes: u64, stars: Option<u8>, tags: &[&str]) -> Session {
        let start: DateTime<Utc> = start.parse().unwrap();
        Session {
            start,
            end: Some(start + chrono::Duration::minutes(minutes as i64)),
            elapsed_secs: minutes * 60,
            pauses: Vec::new(),
            manual: false,
            feedback: stars.map(|stars| Feedback {
                notes: None,
                rating: Some(Rating::new(
                    Stars::new(stars).unwrap(),
                    tags.iter().map(|label| Tag::from_label(label).unwrap()).collect(),
                    None,
                )),
                recorded_at: start,
            }),
        }
    }

    fn sample_store() -> Store {
        let mut hades = Game::new("Hades");
        hades.status = GameStatus::Completed;
        hades.release_date = NaiveDate::from_ymd_opt(2020, 9, 17);
        hades.owned = true;
        hades.baseline_secs = 3600;
        hades.rating = Some(Rating::new(Stars::new(5).unwrap(), Vec::new(), None));
        hades.sessions = vec![
            session("2024-03-01T22:30:00Z", 120, Some(5), &["Fun", "Challenging"]),
            session("2024-03-02T10:00:00Z", 15, Some(2), &["Fun"]),
        ];

        let mut celeste = Game::new("Celeste");
        celeste.status = GameStatus::InProgress;
        celeste.release_date = NaiveDate::from_ymd_opt(2018, 1, 25);
        celeste.sessions = vec![session("2024-03-02T12:00:00Z", 45, None, &[])];

        let tetris = Game::new("Tetris");

        Store {
            games: vec![hades, celeste, tetris],
            ..Store::default()
        }
    }

    #[test]
    fn empty_store_produces_zeroes() {
        let stats = LibraryStats::compute_in(&Store::default(), &Utc);
        assert_eq!(stats.total_games, 0);
        assert_eq!(stats.completion_pct, 0.0);
        assert_eq!(stats.average_session, Duration::ZERO);
        assert!(stats.most_active_day.is_none());
        assert!(stats.release_years.is_empty());
    }

    #[test]
    fn counts_and_playtime() {
        let stats = LibraryStats::compute_in(&sample_store(), &Utc);
        assert_eq!(stats.total_games, 3);
        assert_eq!(stats.status.get(GameStatus::Completed), 1);
        assert_eq!(stats.status.pending, 1);
        assert!((stats.completion_pct - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.owned, 1);
        assert_eq!(stats.session_count, 3);
        assert_eq!(stats.session_time, Duration::from_secs(180 * 60));
        assert_eq!(stats.average_session, Duration::from_secs(60 * 60));
        assert_eq!(stats.total_playtime, Duration::from_secs(240 * 60));
        assert_eq!(stats.average_playtime, Duration::from_secs(80 * 60));
        assert_eq!(stats.playtime_by_game[0].0, "Hades");
        assert_eq!(stats.playtime_by_game.len(), 2);
        assert_eq!(stats.game_ratings.0, [0, 0, 0, 0, 1]);
        assert_eq!(stats.session_ratings.0, [0, 1, 0, 0, 1]);
    }

    #[test]
    fn daily_grouping_follows_time_zone() {
        let utc = LibraryStats::compute_in(&sample_store(), &Utc);
        assert_eq!(utc.daily.len(), 2);
        let busiest = utc.most_active_day.unwrap();
        assert_eq!(busiest.date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(busiest.sessions, 2);

        // 22:30 UTC on the 1st is already the 2nd at UTC+3.
        let east = FixedOffset::east_opt(3 * 3600).unwrap();
        let shifted = LibraryStats::compute_in(&sample_store(), &east);
        assert_eq!(shifted.daily.len(), 1);
        assert_eq!(shifted.daily[0].sessions, 3);
    }

    #[test]
    fn release_years_put_unknown_last() {
        let stats = LibraryStats::compute_in(&sample_store(), &Utc);
        let labels: Vec<String> = stats.release_years.iter().map(YearBreakdown::label).collect();
        assert_eq!(labels, ["2018", "2020", "Unknown"]);
        assert_eq!(stats.release_years[1].completed, 1);
        assert_eq!(stats.release_years[0].open, 1);
    }

    #[test]
    fn session_ratings_are_weighted_by_duration() {
        let stats = LibraryStats::compute_in(&sample_store(), &Utc);
        assert_eq!(stats.session_rating_summaries.len(), 1);
        let summary = &stats.session_rating_summaries[0];
        // 120 minutes weighs 4, 15 minutes is floored to 1: (5*4 + 2*1) / 5.
        assert_eq!(summary.weighted_average, 4.4);
        assert_eq!(summary.rated_sessions, 2);
        assert_eq!(summary.top_tags[0], Tag::from_label("Fun").unwrap());
        assert_eq!(summary.top_tags.len(), 2);
    }
}
