use crate::filters::{Filter, arg_i64, arg_usize};
use crate::value::Value;

/// 与区域设置无关的文本过滤器
pub(crate) fn text_filters() -> Vec<(&'static str, Filter)> {
    vec![
        ("upper", Filter::sync(filter_upper)),
        ("lower", Filter::sync(filter_lower)),
        ("trim", Filter::sync(filter_trim)),
        ("capitalize", Filter::sync(filter_capitalize)),
        ("slugify", Filter::sync(filter_slugify)),
        ("slice", Filter::sync(filter_slice)),
        ("truncate", Filter::sync(filter_truncate)),
        ("pad", Filter::sync(filter_pad)),
        ("replace", Filter::sync(filter_replace)),
        ("default", Filter::sync(filter_default)),
        ("join", Filter::sync(filter_join)),
        ("json", Filter::sync(filter_json)),
    ]
}

fn filter_upper(value: Value, _args: &[String]) -> anyhow::Result<Value> {
    Ok(Value::String(value.to_string().to_uppercase()))
}

fn filter_lower(value: Value, _args: &[String]) -> anyhow::Result<Value> {
    Ok(Value::String(value.to_string().to_lowercase()))
}

fn filter_trim(value: Value, _args: &[String]) -> anyhow::Result<Value> {
    Ok(Value::String(value.to_string().trim().to_string()))
}

fn filter_capitalize(value: Value, _args: &[String]) -> anyhow::Result<Value> {
    let value = value.to_string();
    let mut chars = value.chars();
    Ok(Value::String(match chars.next() {
        None => String::new(),
        Some(first) => {
            let mut result = first.to_uppercase().to_string();
            result.extend(chars);
            result
        }
    }))
}

pub fn slugify(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn filter_slugify(value: Value, _args: &[String]) -> anyhow::Result<Value> {
    Ok(Value::String(slugify(&value.to_string())))
}

/// JavaScript `slice` 的下标规则：负数从末尾计，越界钳制
fn slice_bounds(len: usize, start: i64, end: Option<i64>) -> (usize, usize) {
    let clamp = |idx: i64| -> usize {
        if idx < 0 {
            (len as i64 + idx).max(0) as usize
        } else {
            (idx as usize).min(len)
        }
    };
    let from = clamp(start);
    let to = end.map(clamp).unwrap_or(len);
    (from, to.max(from))
}

fn filter_slice(value: Value, args: &[String]) -> anyhow::Result<Value> {
    let start = arg_i64(args, 0, "slice start")?.unwrap_or(0);
    let end = arg_i64(args, 1, "slice end")?;

    Ok(match value {
        Value::Array(items) => {
            let (from, to) = slice_bounds(items.len(), start, end);
            Value::Array(items[from..to].to_vec())
        }
        other => {
            let chars: Vec<char> = other.to_string().chars().collect();
            let (from, to) = slice_bounds(chars.len(), start, end);
            Value::String(chars[from..to].iter().collect())
        }
    })
}

fn filter_truncate(value: Value, args: &[String]) -> anyhow::Result<Value> {
    let len = arg_usize(args, 0, "truncate length")?.unwrap_or(160);
    let suffix = args.get(1).map(String::as_str).unwrap_or("\u{2026}");

    let value = value.to_string();
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= len {
        return Ok(Value::String(value));
    }
    let mut s: String = chars[..len].iter().collect();
    s.push_str(suffix);
    Ok(Value::String(s))
}

/// pad 的最大目标宽度（字符数）
const MAX_PAD_WIDTH: usize = 10_000;

fn filter_pad(value: Value, args: &[String]) -> anyhow::Result<Value> {
    let width = arg_usize(args, 0, "pad width")?.unwrap_or(0);
    if width > MAX_PAD_WIDTH {
        anyhow::bail!("pad width must be at most {MAX_PAD_WIDTH}, got {width}");
    }
    let fill = match args.get(1).map(String::as_str) {
        None | Some("") => " ",
        Some(f) => f,
    };
    let side = args.get(2).map(|s| s.trim().to_ascii_lowercase());

    let value = value.to_string();
    let current = value.chars().count();
    if current >= width {
        return Ok(Value::String(value));
    }
    let padding: String = fill.chars().cycle().take(width - current).collect();

    Ok(Value::String(match side.as_deref() {
        None | Some("left" | "start" | "") => format!("{padding}{value}"),
        Some("right" | "end") => format!("{value}{padding}"),
        Some(other) => anyhow::bail!("pad side must be left or right, got \"{other}\""),
    }))
}

fn filter_replace(value: Value, args: &[String]) -> anyhow::Result<Value> {
    let [from, to] = args else {
        anyhow::bail!("replace expects 2 arguments, got {}", args.len());
    };
    Ok(Value::String(value.to_string().replace(from.as_str(), to)))
}

fn filter_default(value: Value, args: &[String]) -> anyhow::Result<Value> {
    let fallback = args.first().cloned().unwrap_or_default();
    Ok(match value {
        Value::Null => Value::String(fallback),
        Value::String(s) if s.is_empty() => Value::String(fallback),
        other => other,
    })
}

fn filter_join(value: Value, args: &[String]) -> anyhow::Result<Value> {
    let separator = args.first().map(String::as_str).unwrap_or(",");
    Ok(match value {
        Value::Array(items) => Value::String(
            items
                .iter()
                .map(|item| if item.is_null() { String::new() } else { item.to_string() })
                .collect::<Vec<_>>()
                .join(separator),
        ),
        other => other,
    })
}

fn filter_json(value: Value, _args: &[String]) -> anyhow::Result<Value> {
    Ok(Value::String(serde_json::to_string(&value.to_json())?))
}
