/// 相似名称的最大编辑距离
pub const MAX_DISTANCE: usize = 2;
/// 最多给出的建议数
pub const MAX_SUGGESTIONS: usize = 3;

/// 按编辑距离（忽略大小写）挑选相近名称，距离升序、同距离按名称排序
pub fn suggest<'a, I>(target: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let target = target.to_lowercase();
    let mut scored: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let dist = strsim::levenshtein(&target, &candidate.to_lowercase());
            (dist <= MAX_DISTANCE).then_some((dist, candidate))
        })
        .collect();

    scored.sort_unstable();
    scored.dedup();
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// `. Did you mean "x"?` 或 `. Did you mean one of "a", "b"?`，无建议时为空串
pub fn did_you_mean(suggestions: &[String]) -> String {
    match suggestions {
        [] => String::new(),
        [only] => format!(". Did you mean \"{only}\"?"),
        many => {
            let quoted: Vec<String> = many.iter().map(|s| format!("\"{s}\"")).collect();
            format!(". Did you mean one of {}?", quoted.join(", "))
        }
    }
}
