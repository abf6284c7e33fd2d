use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use super::identity_cluster::{IdentityClusterer, IdentityProfile, count_identity_clusters};
use super::rule_normalizer::round2;
use crate::models::{AnalysisResult, DailyRevenue, MergedRecord, MergedTable, TopDay};

pub const TOP_DAYS: usize = 5;
pub const NO_AUTHOR_SET: &str = "N/A";

/// Order-insensitive set of author names.
pub type AuthorSet = BTreeSet<String>;

/// Split an author string on `,` and `;`, trim each name and drop empty
/// ones. `"Tolkien; Lewis"` and `"Lewis, Tolkien"` give the same set.
pub fn normalize_author(raw: Option<&str>) -> AuthorSet {
    raw.map(|s| {
        s.split([',', ';'])
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// `1234567.891` → `"1,234,567.89"`.
pub fn format_thousands(value: f64) -> String {
    let fixed = format!("{:.2}", value);
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) if rest.chars().any(|c| c.is_ascii_digit() && c != '0') => ("-", rest),
        Some(rest) => ("", rest),
        None => ("", fixed.as_str()),
    };
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}{}.{}", sign, grouped, fraction)
}

fn profile_of(record: &MergedRecord) -> IdentityProfile {
    IdentityProfile::new(
        record.name.as_deref(),
        record.email.as_deref(),
        record.phone.as_deref(),
        record.address.as_deref(),
    )
}

/// Integer ids in numeric order first, then the rest lexicographically.
fn sort_ids(ids: &mut Vec<String>) {
    ids.sort_by_key(|id| match id.parse::<i64>() {
        Ok(v) => (0, v, String::new()),
        Err(_) => (1, 0, id.clone()),
    });
    ids.dedup();
}

#[derive(Debug, Clone, Copy)]
struct Purchase<'a> {
    user_id: Option<&'a str>,
    paid_price: f64,
}

pub struct AnalyticsEngine {
    count_empty_author_set: bool,
}

impl AnalyticsEngine {
    pub fn new(count_empty_author_set: bool) -> Self {
        AnalyticsEngine {
            count_empty_author_set,
        }
    }

    pub fn analyze(&self, merged: &MergedTable) -> AnalysisResult {
        let daily_revenue = self.daily_revenue(&merged.records);
        let top5_days = self.top_days(&daily_revenue, TOP_DAYS);

        let result = AnalysisResult {
            top5_days,
            unique_users: self.unique_users(&merged.records),
            unique_author_sets: self.unique_author_sets(merged),
            most_popular_author_set: self.most_popular_author_set(merged),
            best_buyer_aliases: self.best_buyer(&merged.records),
            daily_revenue,
        };

        info!(
            "Analysis: {} days, {} unique users, {} author sets, most popular '{}', best buyer ids {:?}",
            result.daily_revenue.len(),
            result.unique_users,
            result.unique_author_sets,
            result.most_popular_author_set,
            result.best_buyer_aliases
        );

        result
    }

    /// Revenue summed per calendar day, ascending by date.
    pub fn daily_revenue(&self, records: &[MergedRecord]) -> Vec<DailyRevenue> {
        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for record in records {
            *by_date.entry(record.order.date).or_insert(0.0) += record.order.paid_price;
        }

        by_date
            .into_iter()
            .map(|(date, revenue)| DailyRevenue {
                date,
                revenue: round2(revenue),
            })
            .collect()
    }

    /// The `limit` highest-revenue days. The sort is stable, so equal
    /// revenues keep their date order.
    pub fn top_days(&self, daily: &[DailyRevenue], limit: usize) -> Vec<TopDay> {
        let mut ranked: Vec<&DailyRevenue> = daily.iter().collect();
        ranked.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));

        ranked
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, day)| TopDay {
                rank: i + 1,
                date: day.date,
                revenue: format_thousands(day.revenue),
            })
            .collect()
    }

    /// Number of identity clusters over the merged rows.
    pub fn unique_users(&self, records: &[MergedRecord]) -> usize {
        // A repeated profile always lands in the cluster its first
        // occurrence chose, so only first occurrences need clustering
        let mut seen = HashSet::new();
        let distinct: Vec<IdentityProfile> = records
            .iter()
            .map(profile_of)
            .filter(|p| seen.insert(p.clone()))
            .collect();

        debug!(
            "Clustering {} distinct profiles from {} rows",
            distinct.len(),
            records.len()
        );
        count_identity_clusters(&distinct)
    }

    pub fn unique_author_sets(&self, merged: &MergedTable) -> usize {
        if !merged.has_author_column {
            return 0;
        }

        merged
            .records
            .iter()
            .map(|r| normalize_author(r.author.as_deref()))
            .filter(|set| self.count_empty_author_set || !set.is_empty())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Author set with the most copies sold, names sorted and joined with
    /// `", "`. The first set (in order of appearance) reaching the maximum
    /// wins.
    pub fn most_popular_author_set(&self, merged: &MergedTable) -> String {
        if !merged.has_author_column {
            return NO_AUTHOR_SET.to_string();
        }

        let mut index: HashMap<AuthorSet, usize> = HashMap::new();
        let mut totals: Vec<(AuthorSet, i64)> = Vec::new();

        for record in &merged.records {
            let set = normalize_author(record.author.as_deref());
            if set.is_empty() {
                continue;
            }
            match index.get(&set) {
                Some(&idx) => totals[idx].1 += record.order.quantity,
                None => {
                    index.insert(set.clone(), totals.len());
                    totals.push((set, record.order.quantity));
                }
            }
        }

        let mut best: Option<&(AuthorSet, i64)> = None;
        for entry in &totals {
            if best.is_none_or(|b| entry.1 > b.1) {
                best = Some(entry);
            }
        }

        match best {
            Some((set, _)) => set.iter().cloned().collect::<Vec<_>>().join(", "),
            None => NO_AUTHOR_SET.to_string(),
        }
    }

    /// User ids linked to the identity cluster with the highest total
    /// spend, sorted ascending. Every order contributes its `paid_price`.
    /// Ties go to the cluster created first.
    pub fn best_buyer(&self, records: &[MergedRecord]) -> Vec<String> {
        let mut clusterer = IdentityClusterer::new();
        for record in records {
            clusterer.insert(
                profile_of(record),
                Purchase {
                    user_id: record.order.user_id.as_deref(),
                    paid_price: record.order.paid_price,
                },
            );
        }

        let mut best: Option<(f64, usize)> = None;
        for (idx, cluster) in clusterer.clusters().iter().enumerate() {
            let spend: f64 = cluster.members().iter().map(|p| p.paid_price).sum();
            if best.is_none_or(|(top, _)| spend > top) {
                best = Some((spend, idx));
            }
        }

        let Some((spend, idx)) = best else {
            return Vec::new();
        };

        let mut ids: Vec<String> = clusterer.clusters()[idx]
            .members()
            .iter()
            .filter_map(|p| p.user_id.map(str::to_string))
            .collect();
        sort_ids(&mut ids);

        debug!("Best buyer cluster spent {:.2} across {} ids", spend, ids.len());
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderRecord;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(
        user_id: &str,
        day: NaiveDate,
        quantity: i64,
        paid_price: f64,
        identity: (&str, &str, &str, &str),
        author: Option<&str>,
    ) -> MergedRecord {
        let timestamp = day.and_hms_opt(9, 0, 0).unwrap();
        let (name, email, phone, address) = identity;
        MergedRecord {
            order: OrderRecord {
                order_id: None,
                user_id: Some(user_id.to_string()),
                book_id: Some("1".to_string()),
                quantity,
                unit_price: paid_price,
                timestamp,
                paid_price,
                date: day,
                year: 2024,
                month: 1,
                day: 1,
                source_file: "orders.parquet".to_string(),
                extra: Vec::new(),
            },
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            phone: Some(phone.to_string()),
            address: Some(address.to_string()),
            author: author.map(str::to_string),
            user_extra: Vec::new(),
            book_extra: Vec::new(),
        }
    }

    fn table(records: Vec<MergedRecord>) -> MergedTable {
        MergedTable {
            records,
            has_author_column: true,
        }
    }

    const ANN: (&str, &str, &str, &str) = ("Ann", "ann@mail.com", "111", "Main St");

    #[test]
    fn test_normalize_author() {
        let a = normalize_author(Some("Tolkien; Lewis"));
        let b = normalize_author(Some("Lewis, Tolkien"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);

        assert!(normalize_author(None).is_empty());
        assert!(normalize_author(Some(" ; , ")).is_empty());
        assert_eq!(normalize_author(Some(" Rowling ")).len(), 1);
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(30.0), "30.00");
        assert_eq!(format_thousands(1234.5), "1,234.50");
        assert_eq!(format_thousands(1234567.891), "1,234,567.89");
        assert_eq!(format_thousands(999.999), "1,000.00");
        assert_eq!(format_thousands(-1234.5), "-1,234.50");
        assert_eq!(format_thousands(-0.001), "0.00");
    }

    #[test]
    fn test_daily_revenue_and_top_days() {
        let engine = AnalyticsEngine::new(false);
        let records = vec![
            row("1", date(2024, 1, 1), 1, 10.0, ANN, None),
            row("1", date(2024, 1, 1), 1, 20.0, ANN, None),
            row("1", date(2024, 1, 2), 1, 5.0, ANN, None),
        ];

        let daily = engine.daily_revenue(&records);
        assert_eq!(
            daily,
            vec![
                DailyRevenue { date: date(2024, 1, 1), revenue: 30.0 },
                DailyRevenue { date: date(2024, 1, 2), revenue: 5.0 },
            ]
        );

        // Same set in another order gives the same daily revenue
        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(engine.daily_revenue(&reversed), daily);

        let top = engine.top_days(&daily, TOP_DAYS);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].rank, 1);
        assert_eq!(top[0].date, date(2024, 1, 1));
        assert_eq!(top[0].revenue, "30.00");
        assert_eq!(top[1].rank, 2);
        assert_eq!(top[1].revenue, "5.00");
    }

    #[test]
    fn test_top_days_limit_and_ties() {
        let engine = AnalyticsEngine::new(false);
        let daily: Vec<DailyRevenue> = (1..=7)
            .map(|d| DailyRevenue {
                date: date(2024, 3, d),
                revenue: if d == 2 || d == 5 { 100.0 } else { d as f64 },
            })
            .collect();

        let top = engine.top_days(&daily, TOP_DAYS);
        assert_eq!(top.len(), 5);
        // Equal revenues keep date order
        assert_eq!(top[0].date, date(2024, 3, 2));
        assert_eq!(top[1].date, date(2024, 3, 5));
        assert_eq!(top[2].date, date(2024, 3, 7));
        assert_eq!(
            top.iter().map(|d| d.rank).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn test_unique_users_fuzzy() {
        let engine = AnalyticsEngine::new(false);
        let records = vec![
            row("1", date(2024, 1, 1), 1, 1.0, ("A", "e1", "p1", "a1"), None),
            row("2", date(2024, 1, 1), 1, 1.0, ("A", "e1", "p1", "a2"), None),
            row("3", date(2024, 1, 1), 1, 1.0, ("A", "e2", "p2", "a1"), None),
            row("1", date(2024, 1, 2), 1, 1.0, ("A", "e1", "p1", "a1"), None),
        ];
        assert_eq!(engine.unique_users(&records), 2);
    }

    #[test]
    fn test_author_set_popularity() {
        let engine = AnalyticsEngine::new(false);
        let merged = table(vec![
            row("1", date(2024, 1, 1), 2, 1.0, ANN, Some("Tolkien; Lewis")),
            row("1", date(2024, 1, 1), 3, 1.0, ANN, Some("Rowling")),
            row("1", date(2024, 1, 1), 2, 1.0, ANN, Some("Lewis, Tolkien")),
            row("1", date(2024, 1, 1), 9, 1.0, ANN, None),
        ]);

        assert_eq!(engine.most_popular_author_set(&merged), "Lewis, Tolkien");
        assert_eq!(engine.unique_author_sets(&merged), 2);

        // The empty set only counts when asked to
        assert_eq!(AnalyticsEngine::new(true).unique_author_sets(&merged), 3);
    }

    #[test]
    fn test_author_popularity_first_max_wins() {
        let engine = AnalyticsEngine::new(false);
        let merged = table(vec![
            row("1", date(2024, 1, 1), 4, 1.0, ANN, Some("Rowling")),
            row("1", date(2024, 1, 1), 4, 1.0, ANN, Some("Austen")),
        ]);
        assert_eq!(engine.most_popular_author_set(&merged), "Rowling");
    }

    #[test]
    fn test_author_defaults() {
        let engine = AnalyticsEngine::new(true);

        let no_authors = table(vec![row("1", date(2024, 1, 1), 1, 1.0, ANN, None)]);
        assert_eq!(engine.most_popular_author_set(&no_authors), NO_AUTHOR_SET);

        let mut no_column = table(vec![row("1", date(2024, 1, 1), 1, 1.0, ANN, None)]);
        no_column.has_author_column = false;
        assert_eq!(engine.most_popular_author_set(&no_column), NO_AUTHOR_SET);
        assert_eq!(engine.unique_author_sets(&no_column), 0);
    }

    #[test]
    fn test_best_buyer_links_aliases() {
        let engine = AnalyticsEngine::new(false);
        let records = vec![
            row("7", date(2024, 1, 1), 1, 100.0, ("Ann", "ann@mail.com", "111", "Main St"), None),
            row("3", date(2024, 1, 1), 1, 50.0, ("Anne", "ann@mail.com", "111", "Main St"), None),
            row("9", date(2024, 1, 1), 1, 120.0, ("Bob", "bob@mail.com", "222", "Side St"), None),
        ];

        // 100 + 50 beats 120
        assert_eq!(engine.best_buyer(&records), vec!["3", "7"]);
    }

    #[test]
    fn test_best_buyer_tie_goes_to_first_cluster() {
        let engine = AnalyticsEngine::new(false);
        let records = vec![
            row("2", date(2024, 1, 1), 1, 50.0, ("A", "a@x", "1", "x"), None),
            row("1", date(2024, 1, 1), 1, 50.0, ("B", "b@y", "2", "y"), None),
        ];
        assert_eq!(engine.best_buyer(&records), vec!["2"]);
        assert!(engine.best_buyer(&[]).is_empty());
    }

    #[test]
    fn test_sort_ids_numeric_first() {
        let mut ids = vec![
            "10".to_string(),
            "2".to_string(),
            "b7".to_string(),
            "2".to_string(),
            "a1".to_string(),
        ];
        sort_ids(&mut ids);
        assert_eq!(ids, vec!["2", "10", "a1", "b7"]);
    }
}
