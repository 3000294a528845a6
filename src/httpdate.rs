//! HTTP and cookie date handling.
//!
//! Formatting always produces the RFC 2616 preferred form
//! (`Sun, 06 Nov 1994 08:49:37 GMT`). Parsing accepts that form plus the
//! legacy shapes servers still emit: RFC 850 (`Sunday, 06-Nov-94 ...`),
//! asctime (`Sun Nov  6 08:49:37 1994`), and the Netscape cookie variant
//! with a four-digit dashed year. The weekday is optional, month names are
//! case-insensitive, and two-digit years map to 1970..=2069.

const WDAY: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTH: [&str; 12] = [
  "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Render a POSIX timestamp in RFC 2616 form.
#[must_use]
pub fn format(t: i64) -> String {
  let days = t.div_euclid(86_400);
  let secs = t.rem_euclid(86_400);
  let (year, month, day) = civil_from_days(days);
  let wday = (days + 4).rem_euclid(7) as usize;
  format!(
    "{}, {:02} {} {:04} {:02}:{:02}:{:02} GMT",
    WDAY[wday],
    day,
    MONTH[(month - 1) as usize],
    year,
    secs / 3600,
    (secs / 60) % 60,
    secs % 60,
  )
}

/// Parse an HTTP or cookie date into POSIX seconds.
///
/// Returns `None` when the input matches none of the accepted forms.
#[must_use]
pub fn parse(input: &str) -> Option<i64> {
  let mut tokens: Vec<&str> = input
    .split([' ', '\t', ','])
    .filter(|t| !t.is_empty())
    .collect();

  // Optional leading weekday, full or abbreviated.
  if let Some(first) = tokens.first()
    && first.chars().all(|c| c.is_ascii_alphabetic())
    && WDAY.iter().any(|w| first.len() >= 3 && first[..3].eq_ignore_ascii_case(w))
  {
    tokens.remove(0);
  }

  // Trailing zone label; anything other than GMT/UTC is rejected. Every
  // accepted form otherwise ends in a numeric year or time token.
  if let Some(last) = tokens.last() {
    if last.eq_ignore_ascii_case("GMT") || last.eq_ignore_ascii_case("UTC") {
      tokens.pop();
    } else if last.chars().all(|c| c.is_ascii_alphabetic()) {
      return None;
    }
  }

  let (day, month, year, time) = if let Some(first) = tokens.first() {
    if first.chars().next()?.is_ascii_digit() {
      // RFC 1123 `06 Nov 1994 08:49:37`, RFC 850 `06-Nov-94 08:49:37`,
      // or the Netscape `06-Nov-1994` dashed variant.
      if first.contains('-') {
        let mut parts = first.splitn(3, '-');
        let day = parts.next()?;
        let month = parts.next()?;
        let year = parts.next()?;
        (day, month, year, *tokens.get(1)?)
      } else {
        (*tokens.first()?, *tokens.get(1)?, *tokens.get(2)?, *tokens.get(3)?)
      }
    } else {
      // asctime: `Nov  6 08:49:37 1994`
      (*tokens.get(1)?, *tokens.first()?, *tokens.get(3)?, *tokens.get(2)?)
    }
  } else {
    return None;
  };

  let day: u32 = day.parse().ok()?;
  let month = MONTH
    .iter()
    .position(|m| m.eq_ignore_ascii_case(month))
    .map(|i| i as u32 + 1)?;
  let year = parse_year(year)?;
  let (hour, minute, second) = parse_time(time)?;

  if day == 0 || day > 31 {
    return None;
  }

  Some(days_from_civil(year, month, day) * 86_400 + i64::from(hour) * 3600 + i64::from(minute) * 60 + i64::from(second))
}

fn parse_year(s: &str) -> Option<i64> {
  if !s.chars().all(|c| c.is_ascii_digit()) {
    return None;
  }
  let n: i64 = s.parse().ok()?;
  match s.len() {
    2 => Some(if n < 70 { 2000 + n } else { 1900 + n }),
    4 => Some(n),
    _ => None,
  }
}

fn parse_time(s: &str) -> Option<(u32, u32, u32)> {
  let mut it = s.splitn(3, ':');
  let h: u32 = it.next()?.parse().ok()?;
  let m: u32 = it.next()?.parse().ok()?;
  let sec: u32 = it.next()?.parse().ok()?;
  (h < 24 && m < 60 && sec < 61).then_some((h, m, sec))
}

// Era-based civil <-> day-count conversion (proleptic Gregorian).

fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
  let y = if m <= 2 { y - 1 } else { y };
  let era = if y >= 0 { y } else { y - 399 } / 400;
  let yoe = y - era * 400;
  let mp = i64::from(if m > 2 { m - 3 } else { m + 9 });
  let doy = (153 * mp + 2) / 5 + i64::from(d) - 1;
  let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
  era * 146_097 + doe - 719_468
}

fn civil_from_days(z: i64) -> (i64, u32, u32) {
  let z = z + 719_468;
  let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
  let doe = z - era * 146_097;
  let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
  let y = yoe + era * 400;
  let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
  let mp = (5 * doy + 2) / 153;
  let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
  let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
  (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
  use super::{format, parse};

  const RFC_EXAMPLE: i64 = 784_111_777;

  #[test]
  fn formats_rfc2616_form() {
    assert_eq!(format(RFC_EXAMPLE), "Sun, 06 Nov 1994 08:49:37 GMT");
    assert_eq!(format(0), "Thu, 01 Jan 1970 00:00:00 GMT");
  }

  #[test]
  fn parses_rfc1123() {
    assert_eq!(parse("Sun, 06 Nov 1994 08:49:37 GMT"), Some(RFC_EXAMPLE));
  }

  #[test]
  fn parses_rfc850() {
    assert_eq!(parse("Sunday, 06-Nov-94 08:49:37 GMT"), Some(RFC_EXAMPLE));
  }

  #[test]
  fn parses_asctime() {
    assert_eq!(parse("Sun Nov  6 08:49:37 1994"), Some(RFC_EXAMPLE));
  }

  #[test]
  fn parses_netscape_four_digit_dashed() {
    assert_eq!(parse("Sun, 06-Nov-1994 08:49:37 GMT"), Some(RFC_EXAMPLE));
  }

  #[test]
  fn weekday_is_optional_and_month_case_insensitive() {
    assert_eq!(parse("06 NOV 1994 08:49:37 GMT"), Some(RFC_EXAMPLE));
    assert_eq!(parse("06-nov-94 08:49:37 GMT"), Some(RFC_EXAMPLE));
  }

  #[test]
  fn two_digit_years_pivot_at_70() {
    let y1970 = parse("01-Jan-70 00:00:00 GMT").unwrap();
    assert_eq!(y1970, 0);
    let y2069 = parse("01-Jan-69 00:00:00 GMT").unwrap();
    let y2069_full = parse("01-Jan-2069 00:00:00 GMT").unwrap();
    assert_eq!(y2069, y2069_full);
  }

  #[test]
  fn round_trips_its_own_output() {
    for &t in &[0, 1, 86_399, 86_400, RFC_EXAMPLE, 2_000_000_000] {
      assert_eq!(parse(&format(t)), Some(t), "round trip failed for {t}");
    }
  }

  #[test]
  fn rejects_garbage() {
    assert_eq!(parse(""), None);
    assert_eq!(parse("not a date"), None);
    assert_eq!(parse("99 Foo 1994 08:49:37 GMT"), None);
    assert_eq!(parse("06 Nov 1994"), None);
    assert_eq!(parse("32 Nov 1994 08:49:37 GMT"), None);
  }
}
