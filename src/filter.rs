use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use orderdesk_backend::{Order, OrderStatus};
use std::fmt::Display;
use std::str::FromStr;

use crate::error::FilterError;
use crate::slots::TimeSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(OrderStatus),
}

impl StatusFilter {
    pub fn matches(self, order: &Order) -> bool {
        match self {
            Self::All => true,
            Self::Only(status) => order.status == status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse()
            .map(Self::Only)
            .map_err(|_| FilterError::InvalidStatus(s.to_string()))
    }
}

impl Display for StatusFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Only(status) => write!(f, "{status}"),
        }
    }
}

/// Pickup time constraint. Orders without a pickup time only pass `All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFilter {
    #[default]
    All,
    Upcoming,
    Past,
    Slot(TimeSlot),
}

impl TimeFilter {
    pub fn matches(self, order: &Order, now: DateTime<Utc>, tz: Tz) -> bool {
        if self == Self::All {
            return true;
        }

        let Some(pickup) = order.scheduled_pickup_time else {
            return false;
        };

        match self {
            Self::All => true,
            Self::Upcoming => pickup > now,
            Self::Past => pickup < now,
            Self::Slot(slot) => slot.contains(pickup.with_timezone(&tz).time()),
        }
    }
}

impl FromStr for TimeFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "upcoming" => Ok(Self::Upcoming),
            "past" => Ok(Self::Past),
            slot => slot
                .parse()
                .map(Self::Slot)
                .map_err(|_| FilterError::InvalidTime(s.to_string())),
        }
    }
}

impl Display for TimeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Upcoming => write!(f, "upcoming"),
            Self::Past => write!(f, "past"),
            Self::Slot(slot) => write!(f, "{slot}"),
        }
    }
}

/// Search text, status and pickup time, combined as a conjunction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub search: String,
    pub status: StatusFilter,
    pub time: TimeFilter,
}

impl OrderFilter {
    /// Builds a filter from raw surface input. Missing parts mean "all".
    pub fn parse(
        search: Option<&str>,
        status: Option<&str>,
        time: Option<&str>,
    ) -> Result<Self, FilterError> {
        Ok(Self {
            search: search.unwrap_or_default().trim().to_string(),
            status: status.map(str::parse).transpose()?.unwrap_or_default(),
            time: time.map(str::parse).transpose()?.unwrap_or_default(),
        })
    }

    pub fn matches_search(&self, order: &Order) -> bool {
        if self.search.is_empty() {
            return true;
        }

        let needle = self.search.to_lowercase();
        let contains = |haystack: &str| haystack.to_lowercase().contains(&needle);

        contains(&order.order_number)
            || order.customer_email().is_some_and(contains)
            || order.vendor_name().is_some_and(contains)
    }

    pub fn matches(&self, order: &Order, now: DateTime<Utc>, tz: Tz) -> bool {
        self.matches_search(order) && self.status.matches(order) && self.time.matches(order, now, tz)
    }

    /// Orders passing every predicate, in input order.
    pub fn apply<'a>(&self, orders: &'a [Order], now: DateTime<Utc>, tz: Tz) -> Vec<&'a Order> {
        orders
            .iter()
            .filter(|order| self.matches(order, now, tz))
            .collect()
    }
}
