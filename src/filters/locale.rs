//! 区域化过滤器：数字、货币、百分比、复数与日期。
//!
//! 只覆盖常见语言的分隔符与日期写法，未识别的语言按英语处理。

use crate::filters::{Filter, arg_usize};
use crate::value::Value;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PluralRule {
    /// n == 1
    OneIsSingular,
    /// 0 与 1 都取单数
    ZeroAndOneSingular,
    /// 无单复数区分
    NoPlural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateOrder {
    MonthFirst,
    DayFirst,
    YearFirst,
}

/// 某种语言的格式约定
#[derive(Debug, Clone, Copy)]
pub struct LocaleFormat {
    decimal: char,
    group: char,
    currency_after: bool,
    percent_space: bool,
    plural: PluralRule,
    date_order: DateOrder,
    date_sep: char,
    months: Option<&'static [&'static str; 12]>,
    cjk_suffixes: Option<(&'static str, &'static str, &'static str)>,
}

const EN_MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];
const DE_MONTHS: [&str; 12] = [
    "Januar", "Februar", "März", "April", "Mai", "Juni", "Juli", "August", "September",
    "Oktober", "November", "Dezember",
];
const FR_MONTHS: [&str; 12] = [
    "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août", "septembre",
    "octobre", "novembre", "décembre",
];

const EN: LocaleFormat = LocaleFormat {
    decimal: '.',
    group: ',',
    currency_after: false,
    percent_space: false,
    plural: PluralRule::OneIsSingular,
    date_order: DateOrder::MonthFirst,
    date_sep: '/',
    months: Some(&EN_MONTHS),
    cjk_suffixes: None,
};

impl LocaleFormat {
    /// 按语言子标签选择格式，`de-AT` 与 `de_DE` 都归到 `de`
    pub fn for_locale(tag: &str) -> Self {
        let language = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match language.as_str() {
            "de" => LocaleFormat {
                decimal: ',',
                group: '.',
                currency_after: true,
                percent_space: true,
                date_order: DateOrder::DayFirst,
                date_sep: '.',
                months: Some(&DE_MONTHS),
                ..EN
            },
            "es" | "it" | "nl" => LocaleFormat {
                decimal: ',',
                group: '.',
                currency_after: true,
                percent_space: true,
                date_order: DateOrder::DayFirst,
                months: None,
                ..EN
            },
            "pt" => LocaleFormat {
                decimal: ',',
                group: '.',
                currency_after: true,
                plural: PluralRule::ZeroAndOneSingular,
                date_order: DateOrder::DayFirst,
                months: None,
                ..EN
            },
            "fr" => LocaleFormat {
                decimal: ',',
                group: '\u{202f}',
                currency_after: true,
                percent_space: true,
                plural: PluralRule::ZeroAndOneSingular,
                date_order: DateOrder::DayFirst,
                months: Some(&FR_MONTHS),
                ..EN
            },
            "ja" | "zh" => LocaleFormat {
                plural: PluralRule::NoPlural,
                date_order: DateOrder::YearFirst,
                months: None,
                cjk_suffixes: Some(("年", "月", "日")),
                ..EN
            },
            "ko" => LocaleFormat {
                plural: PluralRule::NoPlural,
                date_order: DateOrder::YearFirst,
                months: None,
                cjk_suffixes: Some(("년 ", "월 ", "일")),
                ..EN
            },
            _ => EN,
        }
    }

    /// 千分位分组；未指定小数位时最多保留三位并去掉末尾的 0
    pub fn format_number(&self, n: f64, decimals: Option<usize>) -> String {
        if n.is_nan() {
            return "NaN".into();
        }
        if n.is_infinite() {
            return if n > 0.0 { "∞".into() } else { "-∞".into() };
        }

        let fixed = match decimals {
            Some(d) => format!("{:.*}", d, n.abs()),
            None => {
                let s = format!("{:.3}", n.abs());
                s.trim_end_matches('0').trim_end_matches('.').to_string()
            }
        };
        let (int_part, frac_part) = match fixed.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (fixed.as_str(), None),
        };

        let mut out = String::new();
        let digits: Vec<char> = int_part.chars().collect();
        for (i, digit) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(self.group);
            }
            out.push(*digit);
        }
        if let Some(frac) = frac_part {
            out.push(self.decimal);
            out.push_str(frac);
        }

        let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
        if n.is_sign_negative() && !is_zero {
            out.insert(0, '-');
        }
        out
    }

    pub fn format_currency(&self, n: f64, code: &str, decimals: Option<usize>) -> String {
        let code = code.trim().to_ascii_uppercase();
        let (symbol, default_decimals) = match code.as_str() {
            "USD" => ("$", 2),
            "EUR" => ("€", 2),
            "GBP" => ("£", 2),
            "JPY" => ("¥", 0),
            "CNY" => ("CN¥", 2),
            _ => (code.as_str(), 2),
        };
        let amount = self.format_number(n.abs(), Some(decimals.unwrap_or(default_decimals)));
        let sign = if n < 0.0 { "-" } else { "" };
        let spaced = symbol.chars().all(|c| c.is_ascii_alphabetic());

        if self.currency_after {
            format!("{sign}{amount}\u{a0}{symbol}")
        } else if spaced {
            format!("{sign}{symbol}\u{a0}{amount}")
        } else {
            format!("{sign}{symbol}{amount}")
        }
    }

    pub fn format_percent(&self, n: f64, decimals: Option<usize>) -> String {
        let number = self.format_number(n * 100.0, Some(decimals.unwrap_or(0)));
        if self.percent_space {
            format!("{number}\u{a0}%")
        } else {
            format!("{number}%")
        }
    }

    pub fn is_singular(&self, n: f64) -> bool {
        match self.plural {
            PluralRule::OneIsSingular => n == 1.0,
            PluralRule::ZeroAndOneSingular => (0.0..2.0).contains(&n.abs()),
            PluralRule::NoPlural => false,
        }
    }

    fn numeric_date(&self, date: NaiveDate, short_year: bool) -> String {
        let year = if short_year {
            format!("{:02}", date.year() % 100)
        } else {
            date.year().to_string()
        };
        let sep = self.date_sep;
        match self.date_order {
            DateOrder::MonthFirst => format!("{}{sep}{}{sep}{year}", date.month(), date.day()),
            DateOrder::DayFirst => format!("{:02}{sep}{:02}{sep}{year}", date.day(), date.month()),
            DateOrder::YearFirst => {
                format!("{}{sep}{:02}{sep}{:02}", date.year(), date.month(), date.day())
            }
        }
    }

    pub fn format_date(&self, date: DateTime<Utc>, style: &str) -> anyhow::Result<String> {
        let day = date.date_naive();
        let month_index = day.month0() as usize;

        Ok(match style {
            "iso" => date.to_rfc3339_opts(SecondsFormat::Secs, true),
            "short" => self.numeric_date(day, self.date_order != DateOrder::YearFirst),
            "medium" => match (self.months, self.date_order) {
                (Some(months), DateOrder::MonthFirst) => {
                    format!("{} {}, {}", &months[month_index][..3], day.day(), day.year())
                }
                _ => self.numeric_date(day, false),
            },
            "long" => match (self.months, self.cjk_suffixes, self.date_order) {
                (_, Some((y, m, d)), _) => {
                    format!("{}{y}{}{m}{}{d}", day.year(), day.month(), day.day())
                }
                (Some(months), _, DateOrder::MonthFirst) => {
                    format!("{} {}, {}", months[month_index], day.day(), day.year())
                }
                (Some(months), _, _) if self.date_sep == '.' => {
                    format!("{}. {} {}", day.day(), months[month_index], day.year())
                }
                (Some(months), _, _) => {
                    format!("{} {} {}", day.day(), months[month_index], day.year())
                }
                (None, None, _) => self.numeric_date(day, false),
            },
            pattern => format_with_pattern(date, pattern)?,
        })
    }
}

/// 按 strftime 模式格式化，非法模式返回错误而不是 panic
fn format_with_pattern(date: DateTime<Utc>, pattern: &str) -> anyhow::Result<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        anyhow::bail!("invalid date format \"{pattern}\"");
    }
    let mut out = String::new();
    write!(out, "{}", date.format_with_items(items.into_iter()))
        .map_err(|_| anyhow::anyhow!("cannot format date with \"{pattern}\""))?;
    Ok(out)
}

/// 日期、RFC 3339 / YYYY-MM-DD 字符串或毫秒时间戳
fn to_datetime(value: &Value) -> anyhow::Result<DateTime<Utc>> {
    match value {
        Value::Date(d) => Ok(*d),
        Value::Number(ms) if ms.is_finite() => DateTime::from_timestamp_millis(*ms as i64)
            .ok_or_else(|| anyhow::anyhow!("timestamp {ms} is out of range")),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(d) = DateTime::parse_from_rfc3339(s) {
                return Ok(d.with_timezone(&Utc));
            }
            if let Ok(d) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Ok(d.and_utc());
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Ok(d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc());
            }
            anyhow::bail!("\"{s}\" is not a recognizable date")
        }
        other => anyhow::bail!("cannot format a {} as a date", other.kind()),
    }
}

/// 小数位上限，与 `Intl.NumberFormat` 的 maximumFractionDigits 一致
const MAX_DECIMALS: usize = 100;

fn decimals_arg(args: &[String], index: usize, what: &str) -> anyhow::Result<Option<usize>> {
    match arg_usize(args, index, what)? {
        Some(d) if d > MAX_DECIMALS => {
            anyhow::bail!("{what} must be at most {MAX_DECIMALS}, got {d}")
        }
        decimals => Ok(decimals),
    }
}

fn number_arg(value: &Value, filter: &str) -> anyhow::Result<f64> {
    let n = value.to_number();
    if n.is_nan() && !matches!(value, Value::Number(_)) {
        anyhow::bail!("{filter} expects a number, got {} \"{value}\"", value.kind());
    }
    Ok(n)
}

pub(crate) fn locale_filters(locale: &str) -> Vec<(&'static str, Filter)> {
    let fmt = LocaleFormat::for_locale(locale);

    vec![
        (
            "number",
            Filter::sync(move |value, args| {
                let decimals = decimals_arg(args, 0, "number decimals")?;
                Ok(Value::String(fmt.format_number(number_arg(&value, "number")?, decimals)))
            }),
        ),
        (
            "currency",
            Filter::sync(move |value, args| {
                let code = args
                    .first()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| anyhow::anyhow!("currency expects a currency code"))?;
                let decimals = decimals_arg(args, 1, "currency decimals")?;
                let n = number_arg(&value, "currency")?;
                Ok(Value::String(fmt.format_currency(n, code, decimals)))
            }),
        ),
        (
            "percent",
            Filter::sync(move |value, args| {
                let decimals = decimals_arg(args, 0, "percent decimals")?;
                Ok(Value::String(fmt.format_percent(number_arg(&value, "percent")?, decimals)))
            }),
        ),
        (
            "plural",
            Filter::sync(move |value, args| {
                let [one, other] = args else {
                    anyhow::bail!("plural expects 2 arguments, got {}", args.len());
                };
                let n = number_arg(&value, "plural")?;
                Ok(Value::String(if fmt.is_singular(n) { one.clone() } else { other.clone() }))
            }),
        ),
        (
            "date",
            Filter::sync(move |value, args| {
                let style = args.first().map(|s| s.as_str()).unwrap_or("medium");
                let date = to_datetime(&value)?;
                Ok(Value::String(fmt.format_date(date, style)?))
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn numbers_group_by_locale() {
        let en = LocaleFormat::for_locale("en-US");
        assert_eq!(en.format_number(1234567.891, None), "1,234,567.891");
        assert_eq!(en.format_number(1234.5, Some(2)), "1,234.50");
        assert_eq!(en.format_number(-0.0001, None), "0");
        assert_eq!(en.format_number(-42.0, None), "-42");
        assert_eq!(en.format_number(999.0, None), "999");

        let de = LocaleFormat::for_locale("de_DE");
        assert_eq!(de.format_number(1234.5, None), "1.234,5");

        let fr = LocaleFormat::for_locale("fr");
        assert_eq!(fr.format_number(1234.5, None), "1\u{202f}234,5");
    }

    #[test]
    fn currency_symbol_placement() {
        let en = LocaleFormat::for_locale("en");
        assert_eq!(en.format_currency(1234.5, "usd", None), "$1,234.50");
        assert_eq!(en.format_currency(-5.0, "EUR", None), "-€5.00");
        assert_eq!(en.format_currency(1500.0, "JPY", None), "¥1,500");
        assert_eq!(en.format_currency(3.0, "CHF", None), "CHF\u{a0}3.00");

        let de = LocaleFormat::for_locale("de-DE");
        assert_eq!(de.format_currency(1234.5, "EUR", None), "1.234,50\u{a0}€");
    }

    #[test]
    fn percent() {
        assert_eq!(LocaleFormat::for_locale("en").format_percent(0.456, None), "46%");
        assert_eq!(LocaleFormat::for_locale("de").format_percent(0.5, Some(1)), "50,0\u{a0}%");
    }

    #[test]
    fn plural_rules() {
        let en = LocaleFormat::for_locale("en");
        assert!(en.is_singular(1.0));
        assert!(!en.is_singular(0.0));
        let fr = LocaleFormat::for_locale("fr-CA");
        assert!(fr.is_singular(0.0));
        assert!(fr.is_singular(1.5));
        assert!(!fr.is_singular(2.0));
        assert!(!LocaleFormat::for_locale("ja").is_singular(1.0));
    }

    #[test]
    fn date_styles() {
        let en = LocaleFormat::for_locale("en-US");
        assert_eq!(en.format_date(date(), "short").unwrap(), "3/5/24");
        assert_eq!(en.format_date(date(), "medium").unwrap(), "Mar 5, 2024");
        assert_eq!(en.format_date(date(), "long").unwrap(), "March 5, 2024");
        assert_eq!(en.format_date(date(), "iso").unwrap(), "2024-03-05T14:07:09Z");
        assert_eq!(en.format_date(date(), "%Y/%m/%d %H:%M").unwrap(), "2024/03/05 14:07");

        let de = LocaleFormat::for_locale("de");
        assert_eq!(de.format_date(date(), "short").unwrap(), "05.03.24");
        assert_eq!(de.format_date(date(), "long").unwrap(), "5. März 2024");

        let fr = LocaleFormat::for_locale("fr");
        assert_eq!(fr.format_date(date(), "long").unwrap(), "5 mars 2024");

        let ja = LocaleFormat::for_locale("ja-JP");
        assert_eq!(ja.format_date(date(), "long").unwrap(), "2024年3月5日");
        assert_eq!(ja.format_date(date(), "short").unwrap(), "2024/03/05");
    }

    #[test]
    fn invalid_date_pattern_is_an_error() {
        let en = LocaleFormat::for_locale("en");
        assert!(en.format_date(date(), "%Y %").is_err());
    }

    #[test]
    fn date_inputs() {
        assert_eq!(to_datetime(&Value::from("2024-03-05")).unwrap().day(), 5);
        assert_eq!(
            to_datetime(&Value::from("2024-03-05T14:07:09+02:00")).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 5, 12, 7, 9).unwrap()
        );
        assert_eq!(to_datetime(&Value::from(0.0)).unwrap().year(), 1970);
        assert!(to_datetime(&Value::from("yesterday")).is_err());
        assert!(to_datetime(&Value::Bool(true)).is_err());
    }

    #[test]
    fn filters_reject_non_numbers() {
        let filters = locale_filters("en");
        let (_, number) = filters.iter().find(|(name, _)| *name == "number").unwrap();
        let Filter::Sync(f) = number else { panic!("number is sync") };
        assert!(f(Value::from("abc"), &[]).is_err());
        assert_eq!(f(Value::from("1500"), &[]).unwrap(), Value::from("1,500"));
    }

    #[test]
    fn decimals_are_bounded() {
        let filters = locale_filters("en");
        for (name, args) in [
            ("number", vec!["70000".to_string()]),
            ("percent", vec!["101".to_string()]),
            ("currency", vec!["USD".to_string(), "70000".to_string()]),
        ] {
            let (_, filter) = filters.iter().find(|(n, _)| *n == name).unwrap();
            let Filter::Sync(f) = filter else { panic!("{name} is sync") };
            let err = f(Value::from(1.5), &args).unwrap_err();
            assert!(err.to_string().contains("at most 100"), "{name}: {err}");
        }

        let (_, number) = filters.iter().find(|(n, _)| *n == "number").unwrap();
        let Filter::Sync(f) = number else { panic!("number is sync") };
        let wide = f(Value::from(1.5), &["100".to_string()]).unwrap().to_string();
        assert_eq!(wide.len(), 102);
    }
}
