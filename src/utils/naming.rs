/*
 * @Author       : 老董
 * @Date         : 2026-02-11
 * @Description  : 命名工具：类名转 snake_case、按前缀生成唯一名称
 */

use std::collections::HashMap;

/// 将类名转为 snake_case，如 `InputLayer` -> `input_layer`，`HTTPServer` -> `http_server`
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if next_is_lower || prev.is_lowercase() {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// 按前缀计数的唯一名称生成器：`dense`、`dense_1`、`dense_2`……
#[derive(Debug, Default, Clone)]
pub struct UniqueNamer {
    counts: HashMap<String, usize>,
}

impl UniqueNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, prefix: &str) -> String {
        let count = self.counts.entry(prefix.to_string()).or_insert(0);
        let name = if *count == 0 {
            prefix.to_string()
        } else {
            format!("{prefix}_{count}")
        };
        *count += 1;
        name
    }
}
