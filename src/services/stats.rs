//! Dashboard statistics

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::enums::TransactionStatus,
    repository::Repository,
};

/// Months shown on the revenue chart, current month included
const CHART_MONTHS: i32 = 6;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LibraryStats {
    pub total_titles: i64,
    /// Open `borrowing` loans
    pub borrowing: i64,
    pub overdue: i64,
    /// Sum of paid fines
    pub revenue: i64,
    /// `revenue` with dot thousands separators
    pub revenue_fmt: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Series {
    pub labels: Vec<String>,
    pub values: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChartData {
    /// Available against in-use copies
    pub pie: Series,
    /// Paid fine revenue per month, oldest first
    pub bar: Series,
}

/// Format an amount as `1.234.567`
pub fn format_thousands(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// First instant of the month `back` months before `now`'s month
fn month_start(now: DateTime<Utc>, back: i32) -> AppResult<DateTime<Utc>> {
    let index = now.year() * 12 + now.month0() as i32 - back;
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|start| start.and_utc())
        .ok_or_else(|| AppError::Internal(format!("Invalid chart month offset {}", back)))
}

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn stats(&self) -> AppResult<LibraryStats> {
        let total_titles = self.repository.count_titles().await?;
        let borrowing = self
            .repository
            .count_transactions(None, &[TransactionStatus::Borrowing])
            .await?;
        let overdue = self.repository.count_overdue(Utc::now()).await?;
        let revenue = self.repository.fine_revenue(None, None).await?;

        Ok(LibraryStats {
            total_titles,
            borrowing,
            overdue,
            revenue,
            revenue_fmt: format_thousands(revenue),
        })
    }

    pub async fn chart_data(&self) -> AppResult<ChartData> {
        let counts = self.repository.copy_counts().await?;
        let pie = Series {
            labels: vec!["Available".to_string(), "In use".to_string()],
            values: vec![counts.available, counts.in_use],
        };

        let now = Utc::now();
        let mut bar = Series {
            labels: Vec::with_capacity(CHART_MONTHS as usize),
            values: Vec::with_capacity(CHART_MONTHS as usize),
        };
        for back in (0..CHART_MONTHS).rev() {
            let from = month_start(now, back)?;
            let to = month_start(now, back - 1)?;
            bar.labels.push(from.format("%m/%Y").to_string());
            bar.values
                .push(self.repository.fine_revenue(Some(from), Some(to)).await?);
        }

        Ok(ChartData { pie, bar })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn thousands_use_dots() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1.000");
        assert_eq!(format_thousands(1234567), "1.234.567");
        assert_eq!(format_thousands(-25000), "-25.000");
    }

    #[test]
    fn month_start_crosses_year_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 2, 15, 10, 0, 0).unwrap();
        assert_eq!(
            month_start(now, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            month_start(now, 3).unwrap(),
            Utc.with_ymd_and_hms(2023, 11, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            month_start(now, -1).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }
}
