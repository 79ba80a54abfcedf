//! 금액 타입
//!
//! 모든 금액은 최소 단위(1/100)의 정수로 보관합니다.
//! 반올림 규칙은 하나뿐입니다: 소수 둘째 자리 half-up (0에서 먼 쪽).

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 1 단위 = 100 최소 단위
const SCALE: i64 = 100;

/// 비율 계산 분모 (basis point)
pub const BPS_DENOMINATOR: u32 = 10_000;

/// 고정소수점 금액 (최소 단위 정수)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// 정수 단위 금액 (예: 500 → 500.00)
    pub const fn from_units(units: i64) -> Self {
        Self(units * SCALE)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// 금액에 비율(bps)을 곱하고 half-up 반올림
    ///
    /// `bps`는 `BPS_DENOMINATOR` 이하여야 하므로 결과의 절댓값은 원금을 넘지 않습니다.
    pub fn apply_bps(self, bps: u32) -> Money {
        let bps = bps.min(BPS_DENOMINATOR) as i128;
        let denominator = BPS_DENOMINATOR as i128;
        let scaled = self.0 as i128 * bps;
        let quotient = scaled / denominator;
        let remainder = scaled % denominator;
        let rounded = if remainder.abs() * 2 >= denominator {
            quotient + scaled.signum()
        } else {
            quotient
        };
        Money(rounded as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / SCALE as u64, abs % SCALE as u64)
    }
}

/// 금액 문자열 파싱 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyParseError {
    #[error("빈 금액 문자열")]
    Empty,
    #[error("잘못된 금액 형식: {0}")]
    InvalidFormat(String),
    #[error("금액 범위 초과: {0}")]
    Overflow(String),
}

impl FromStr for Money {
    type Err = MoneyParseError;

    /// "500", "500.5", "500.005" 형태를 받아 소수 둘째 자리로 반올림합니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MoneyParseError::Empty);
        }

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
        {
            return Err(MoneyParseError::InvalidFormat(s.to_string()));
        }

        let overflow = || MoneyParseError::Overflow(s.to_string());

        let units: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };

        let frac = frac_part.as_bytes();
        let digit_at = |idx: usize| frac.get(idx).map(|b| (b - b'0') as i64).unwrap_or(0);
        let mut cents = digit_at(0) * 10 + digit_at(1);
        if digit_at(2) >= 5 {
            cents += 1;
        }

        let total = units
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(cents))
            .ok_or_else(overflow)?;

        Ok(Money(if negative { -total } else { total }))
    }
}
