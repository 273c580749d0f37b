use crate::domain::model::{MergedDataset, ResultTable, TripRecord, Value};
use chrono::Duration;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

const WINDOW_DAYS: i64 = 14;
const TOP_STATION_RANKS: i64 = 3;
const TOP_AGE_GROUPS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    DailyAverageDuration,
    DailyTripCount,
    MonthlyTopStartStation,
    TopThreeStationsLastTwoWeeks,
    AverageDurationByGender,
    TopTenAgeGroupsByDuration,
}

impl Query {
    pub const ALL: [Query; 6] = [
        Query::DailyAverageDuration,
        Query::DailyTripCount,
        Query::MonthlyTopStartStation,
        Query::TopThreeStationsLastTwoWeeks,
        Query::AverageDurationByGender,
        Query::TopTenAgeGroupsByDuration,
    ];

    /// Output name, unique per query.
    pub fn name(&self) -> &'static str {
        match self {
            Query::DailyAverageDuration => "daily_average_trip_duration",
            Query::DailyTripCount => "daily_trip_count",
            Query::MonthlyTopStartStation => "monthly_top_start_station",
            Query::TopThreeStationsLastTwoWeeks => "top_three_stations_last_two_weeks",
            Query::AverageDurationByGender => "average_duration_by_gender",
            Query::TopTenAgeGroupsByDuration => "top_ten_age_groups_by_duration",
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: u64,
}

impl Mean {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn value(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Read-only query surface over one merged dataset.
///
/// Every query is a pure function of the dataset; the engine can be shared
/// across threads behind an `Arc` and queried concurrently.
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    dataset: Arc<MergedDataset>,
}

impl AggregationEngine {
    pub fn new(dataset: Arc<MergedDataset>) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &MergedDataset {
        &self.dataset
    }

    pub fn run(&self, query: Query) -> ResultTable {
        let table = match query {
            Query::DailyAverageDuration => self.daily_average_duration(),
            Query::DailyTripCount => self.daily_trip_count(),
            Query::MonthlyTopStartStation => self.monthly_top_start_station(),
            Query::TopThreeStationsLastTwoWeeks => self.top_three_stations_last_two_weeks(),
            Query::AverageDurationByGender => self.average_duration_by_gender(),
            Query::TopTenAgeGroupsByDuration => self.top_ten_age_groups_by_duration(),
        };
        tracing::debug!("{} produced {} rows", query, table.len());
        table
    }

    fn records(&self) -> &[TripRecord] {
        self.dataset.records()
    }

    /// `(day, average_trip_duration)`, ascending by day.
    pub fn daily_average_duration(&self) -> ResultTable {
        let mut by_day: BTreeMap<String, Mean> = BTreeMap::new();
        for record in self.records() {
            by_day.entry(day_key(record)).or_default().add(record.trip_duration_seconds);
        }

        let mut table = ResultTable::new(
            Query::DailyAverageDuration.name(),
            &["day", "average_trip_duration"],
        );
        for (day, mean) in by_day {
            table.push_row(vec![day.into(), mean.value().into()]);
        }
        table
    }

    /// `(day, trip_count)`, ascending by day.
    pub fn daily_trip_count(&self) -> ResultTable {
        let mut by_day: BTreeMap<String, i64> = BTreeMap::new();
        for record in self.records() {
            *by_day.entry(day_key(record)).or_default() += 1;
        }

        let mut table = ResultTable::new(Query::DailyTripCount.name(), &["day", "trip_count"]);
        for (day, count) in by_day {
            table.push_row(vec![day.into(), count.into()]);
        }
        table
    }

    /// `(month, most_popular_starting_station)`, ascending by month. When
    /// stations tie on count the lexicographically smallest name wins.
    pub fn monthly_top_start_station(&self) -> ResultTable {
        let mut by_month: BTreeMap<String, BTreeMap<&str, u64>> = BTreeMap::new();
        for record in self.records() {
            let month = record.start_time.format("%Y-%m").to_string();
            *by_month
                .entry(month)
                .or_default()
                .entry(record.from_station_name.as_str())
                .or_default() += 1;
        }

        let mut table = ResultTable::new(
            Query::MonthlyTopStartStation.name(),
            &["month", "most_popular_starting_station"],
        );
        for (month, stations) in by_month {
            // ascending iteration + strict comparison keeps the smallest name on ties
            let mut best: Option<(&str, u64)> = None;
            for (station, count) in stations {
                if best.map_or(true, |(_, top)| count > top) {
                    best = Some((station, count));
                }
            }
            if let Some((station, _)) = best {
                table.push_row(vec![month.into(), station.into()]);
            }
        }
        table
    }

    /// Stations counted over the 14 days ending at the latest trip in the
    /// dataset, dense-ranked by count, keeping every station with rank <= 3.
    ///
    /// Rows are ordered by rank, then station id, then station name.
    pub fn top_three_stations_last_two_weeks(&self) -> ResultTable {
        let mut table = ResultTable::new(
            Query::TopThreeStationsLastTwoWeeks.name(),
            &["from_station_id", "from_station_name", "count", "rank"],
        );

        let Some(end) = self.records().iter().map(|r| r.start_time).max() else {
            return table;
        };
        let start = end - Duration::days(WINDOW_DAYS);

        let mut counts: BTreeMap<(&str, &str), i64> = BTreeMap::new();
        for record in self
            .records()
            .iter()
            .filter(|r| r.start_time >= start && r.start_time <= end)
        {
            *counts
                .entry((record.from_station_id.as_str(), record.from_station_name.as_str()))
                .or_default() += 1;
        }

        let mut stations: Vec<((&str, &str), i64)> = counts.into_iter().collect();
        // stable: equal counts keep (id, name) order from the BTreeMap
        stations.sort_by(|a, b| b.1.cmp(&a.1));

        let mut rank = 0;
        let mut previous = None;
        for ((id, name), count) in stations {
            if previous != Some(count) {
                rank += 1;
                previous = Some(count);
            }
            if rank > TOP_STATION_RANKS {
                break;
            }
            table.push_row(vec![id.into(), name.into(), count.into(), rank.into()]);
        }
        table
    }

    /// `(gender, average_trip_duration)`, ascending by gender with the
    /// missing-gender group first.
    pub fn average_duration_by_gender(&self) -> ResultTable {
        let mut by_gender: BTreeMap<Option<&str>, Mean> = BTreeMap::new();
        for record in self.records() {
            by_gender
                .entry(record.gender.as_deref())
                .or_default()
                .add(record.trip_duration_seconds);
        }

        let mut table = ResultTable::new(
            Query::AverageDurationByGender.name(),
            &["gender", "average_trip_duration"],
        );
        for (gender, mean) in by_gender {
            table.push_row(vec![gender.into(), mean.value().into()]);
        }
        table
    }

    /// The ten birth-year groups with the longest average trip. Groups are
    /// derived in first-appearance order and sorted stably, so ties keep that
    /// order.
    pub fn top_ten_age_groups_by_duration(&self) -> ResultTable {
        let mut groups: Vec<(Option<i32>, Mean)> = Vec::new();
        let mut positions: HashMap<Option<i32>, usize> = HashMap::new();
        for record in self.records() {
            let slot = *positions.entry(record.birth_year).or_insert_with(|| {
                groups.push((record.birth_year, Mean::default()));
                groups.len() - 1
            });
            groups[slot].1.add(record.trip_duration_seconds);
        }

        let mut averages: Vec<(Option<i32>, f64)> = groups
            .into_iter()
            .map(|(year, mean)| (year, mean.value()))
            .collect();
        averages.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut table = ResultTable::new(
            Query::TopTenAgeGroupsByDuration.name(),
            &["birth_year", "average_trip_duration"],
        );
        for (year, average) in averages.into_iter().take(TOP_AGE_GROUPS) {
            table.push_row(vec![year.map(i64::from).into(), average.into()]);
        }
        table
    }
}

fn day_key(record: &TripRecord) -> String {
    record.start_time.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::merger::parse_timestamp;

    fn trip(start: &str, duration: f64, station: (&str, &str)) -> TripRecord {
        TripRecord {
            start_time: parse_timestamp(start).unwrap(),
            trip_duration_seconds: duration,
            from_station_id: station.0.to_string(),
            from_station_name: station.1.to_string(),
            gender: None,
            birth_year: None,
            values: Vec::new(),
        }
    }

    fn engine(records: Vec<TripRecord>) -> AggregationEngine {
        AggregationEngine::new(Arc::new(MergedDataset::new(Vec::new(), records)))
    }

    fn text(v: &str) -> Value {
        Value::Text(v.to_string())
    }

    #[test]
    fn test_daily_queries_group_by_calendar_date() {
        let engine = engine(vec![
            trip("2019-01-02 23:59:59", 30.0, ("1", "A")),
            trip("2019-01-01 08:00:00", 100.0, ("1", "A")),
            trip("2019-01-01 09:00:00", 200.0, ("2", "B")),
        ]);

        let average = engine.daily_average_duration();
        assert_eq!(average.columns, vec!["day", "average_trip_duration"]);
        assert_eq!(
            average.rows,
            vec![
                vec![text("2019-01-01"), Value::Float(150.0)],
                vec![text("2019-01-02"), Value::Float(30.0)],
            ]
        );

        let count = engine.daily_trip_count();
        assert_eq!(
            count.rows,
            vec![
                vec![text("2019-01-01"), Value::Int(2)],
                vec![text("2019-01-02"), Value::Int(1)],
            ]
        );
    }

    #[test]
    fn test_monthly_top_station_breaks_ties_by_name() {
        let engine = engine(vec![
            trip("2019-02-01 08:00:00", 1.0, ("2", "Wells St")),
            trip("2019-02-02 08:00:00", 1.0, ("1", "Clark St")),
            trip("2019-01-05 08:00:00", 1.0, ("3", "State St")),
            trip("2019-01-06 08:00:00", 1.0, ("3", "State St")),
            trip("2019-01-07 08:00:00", 1.0, ("1", "Clark St")),
        ]);

        let table = engine.monthly_top_start_station();
        assert_eq!(
            table.rows,
            vec![
                vec![text("2019-01"), text("State St")],
                vec![text("2019-02"), text("Clark St")],
            ]
        );
    }

    #[test]
    fn test_dense_rank_keeps_ties_at_every_rank() {
        let mut records = Vec::new();
        let stations = [
            (("A", "Alpha"), 10),
            (("B", "Bravo"), 10),
            (("C", "Charlie"), 8),
            (("D", "Delta"), 5),
            (("E", "Echo"), 2),
        ];
        for (station, count) in stations {
            for _ in 0..count {
                records.push(trip("2019-06-20 12:00:00", 60.0, station));
            }
        }

        let table = engine(records).top_three_stations_last_two_weeks();
        assert_eq!(
            table.rows,
            vec![
                vec![text("A"), text("Alpha"), Value::Int(10), Value::Int(1)],
                vec![text("B"), text("Bravo"), Value::Int(10), Value::Int(1)],
                vec![text("C"), text("Charlie"), Value::Int(8), Value::Int(2)],
                vec![text("D"), text("Delta"), Value::Int(5), Value::Int(3)],
            ]
        );
    }

    #[test]
    fn test_dense_rank_tie_at_third_place_returns_every_tied_station() {
        let mut records = Vec::new();
        let stations = [
            (("A", "Alpha"), 10),
            (("B", "Bravo"), 8),
            (("C", "Charlie"), 5),
            (("D", "Delta"), 5),
            (("E", "Echo"), 2),
        ];
        for (station, count) in stations {
            for _ in 0..count {
                records.push(trip("2019-06-20 12:00:00", 60.0, station));
            }
        }

        let table = engine(records).top_three_stations_last_two_weeks();
        assert_eq!(
            table.rows,
            vec![
                vec![text("A"), text("Alpha"), Value::Int(10), Value::Int(1)],
                vec![text("B"), text("Bravo"), Value::Int(8), Value::Int(2)],
                vec![text("C"), text("Charlie"), Value::Int(5), Value::Int(3)],
                vec![text("D"), text("Delta"), Value::Int(5), Value::Int(3)],
            ]
        );
    }

    #[test]
    fn test_two_week_window_is_anchored_at_latest_trip() {
        let engine = engine(vec![
            trip("2019-06-30 10:00:00", 1.0, ("1", "Latest")),
            trip("2019-06-16 10:00:00", 1.0, ("2", "OnBoundary")),
            trip("2019-06-16 09:59:59", 1.0, ("3", "TooOld")),
            trip("2019-06-16 09:59:59", 1.0, ("3", "TooOld")),
        ]);

        let table = engine.top_three_stations_last_two_weeks();
        let names: Vec<&Value> = table.rows.iter().map(|r| &r[1]).collect();
        assert_eq!(names, vec![&text("Latest"), &text("OnBoundary")]);
        assert!(table.rows.iter().all(|r| r[3] == Value::Int(1)));
    }

    #[test]
    fn test_gender_groups_include_missing() {
        let mut male = trip("2019-01-01 08:00:00", 100.0, ("1", "A"));
        male.gender = Some("Male".to_string());
        let mut female = trip("2019-01-01 08:00:00", 300.0, ("1", "A"));
        female.gender = Some("Female".to_string());
        let unknown = trip("2019-01-01 08:00:00", 50.0, ("1", "A"));
        let mut male_again = male.clone();
        male_again.trip_duration_seconds = 200.0;

        let table = engine(vec![male, female, unknown, male_again]).average_duration_by_gender();
        assert_eq!(
            table.rows,
            vec![
                vec![Value::Null, Value::Float(50.0)],
                vec![text("Female"), Value::Float(300.0)],
                vec![text("Male"), Value::Float(150.0)],
            ]
        );
    }

    #[test]
    fn test_top_ten_age_groups_is_stable_on_ties() {
        let mut records = Vec::new();
        let mut push = |year: i32, duration: f64| {
            let mut r = trip("2019-01-01 08:00:00", duration, ("1", "A"));
            r.birth_year = Some(year);
            records.push(r);
        };
        // 2000 shows up before 1990; both average 500
        push(2000, 500.0);
        for (i, year) in (1970..1982).enumerate() {
            push(year, 100.0 + i as f64);
        }
        push(1990, 400.0);
        push(1990, 600.0);

        let table = engine(records).top_ten_age_groups_by_duration();

        assert_eq!(table.len(), 10);
        assert_eq!(table.rows[0], vec![Value::Int(2000), Value::Float(500.0)]);
        assert_eq!(table.rows[1], vec![Value::Int(1990), Value::Float(500.0)]);
        assert_eq!(table.rows[2], vec![Value::Int(1981), Value::Float(111.0)]);
        assert_eq!(table.rows[9], vec![Value::Int(1974), Value::Float(104.0)]);
    }

    #[test]
    fn test_missing_birth_year_forms_a_group() {
        let mut known = trip("2019-01-01 08:00:00", 10.0, ("1", "A"));
        known.birth_year = Some(1985);
        let unknown = trip("2019-01-01 08:00:00", 20.0, ("1", "A"));

        let table = engine(vec![known, unknown]).top_ten_age_groups_by_duration();
        assert_eq!(
            table.rows,
            vec![
                vec![Value::Null, Value::Float(20.0)],
                vec![Value::Int(1985), Value::Float(10.0)],
            ]
        );
    }

    #[test]
    fn test_empty_dataset_yields_empty_tables() {
        let engine = engine(Vec::new());
        for query in Query::ALL {
            let table = engine.run(query);
            assert!(table.is_empty(), "{} should be empty", query);
            assert_eq!(table.name, query.name());
        }
    }
}
