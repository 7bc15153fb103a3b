pub mod year_month;

pub use year_month::{days_in_month, is_leap_year, YearMonth};
