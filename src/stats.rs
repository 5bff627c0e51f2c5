//! Terminal reports for `portal analytics` and `portal index stats`.

use crate::analytics::AnalyticsOverview;
use crate::index::IndexStats;

/// Print the analytics overview as a table.
pub fn print_overview(report: &AnalyticsOverview) {
    let totals = &report.overview;

    println!("Portal Search: Analytics");
    println!("=========================");
    println!();
    println!(
        "  Window:      {} → {} ({} days)",
        short_date(&totals.date_range.start),
        short_date(&totals.date_range.end),
        totals.date_range.days.unwrap_or_default()
    );
    println!("  Searches:    {}", totals.total_searches);
    println!("  Unique:      {}", totals.unique_queries);
    println!("  Avg results: {:.1}", totals.avg_results_per_query);

    if !report.search_volume.is_empty() {
        println!();
        println!("  Volume by day:");
        for day in &report.search_volume {
            println!("  {:<12} {:>6}  {}", day.date, day.count, bar(day.count, max_volume(report)));
        }
    }

    if !report.top_queries.is_empty() {
        println!();
        println!("  {:<40} {:>6} {:>12}", "TOP QUERY", "COUNT", "AVG RESULTS");
        println!("  {}", "-".repeat(60));
        for q in &report.top_queries {
            println!("  {:<40} {:>6} {:>12.1}", truncate(&q.query, 40), q.count, q.avg_results);
        }
    }

    if !report.no_result_queries.is_empty() {
        println!();
        println!("  {:<40} {:>6}", "NO-RESULT QUERY", "COUNT");
        println!("  {}", "-".repeat(47));
        for q in &report.no_result_queries {
            println!("  {:<40} {:>6}", truncate(&q.query, 40), q.count);
        }
    }

    println!();
}

/// Print index statistics.
pub fn print_index_stats(index_name: &str, stats: &IndexStats) {
    println!("Index: {}", index_name);
    println!("  Documents:   {}", stats.number_of_documents);
    println!("  Indexing:    {}", if stats.is_indexing { "yes" } else { "no" });
    if !stats.field_distribution.is_empty() {
        println!("  Fields:");
        for (field, count) in &stats.field_distribution {
            println!("    {:<20} {:>6}", field, count);
        }
    }
}

fn max_volume(report: &AnalyticsOverview) -> u64 {
    report
        .search_volume
        .iter()
        .map(|d| d.count)
        .max()
        .unwrap_or(0)
}

fn bar(count: u64, max: u64) -> String {
    if max == 0 {
        return String::new();
    }
    "#".repeat(((count * 30) / max).max(1) as usize)
}

fn short_date(iso: &str) -> &str {
    iso.get(..10).unwrap_or(iso)
}

/// Truncate to `width` characters, marking the cut with `…`.
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
