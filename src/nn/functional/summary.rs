/*
 * @Author       : 老董
 * @Date         : 2026-02-14
 * @Description  : Functional 的模型摘要（summary）
 */

use super::Functional;
use crate::nn::graph::OperationId;
use std::path::Path;

/// 摘要中的一行
struct SummaryRow {
    name: String,
    class_name: String,
    output_shape: String,
    params: usize,
    trainable: bool,
    connected_to: String,
}

impl Functional {
    /// 打印模型摘要（类似 Keras 的 `model.summary()`）
    ///
    /// # 示例
    /// ```ignore
    /// model.summary();
    /// // 输出：
    /// // ┌─────────────┬────────────┬──────────┬────────────┬──────────────────┐
    /// // │ 层名称      │ 类型       │ 输出形状 │ 参数量     │ 连接到           │
    /// // ├─────────────┼────────────┼──────────┼────────────┼──────────────────┤
    /// // │ input_layer │ InputLayer │ (None, 4)│          0 │ -                │
    /// // │ dense       │ Dense      │ (None, 3)│         15 │ input_layer[0][0]│
    /// // ...
    /// ```
    pub fn summary(&self) {
        println!("{}", self.summary_string());
    }

    /// 将模型摘要保存到文件：`.md` 保存为 Markdown 表格，其余保存为文本表格
    pub fn save_summary<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let path = path.as_ref();
        let summary = match path.extension().and_then(|e| e.to_str()) {
            Some("md") => self.summary_markdown(),
            _ => self.summary_string(),
        };
        std::fs::write(path, summary)
    }

    fn summary_rows(&self) -> Vec<SummaryRow> {
        let layer_name = |op: OperationId| {
            self.function
                .layer(op)
                .and_then(|layer| layer.try_borrow().ok().map(|l| l.name().to_string()))
                .unwrap_or_else(|| op.to_string())
        };

        let mut rows = Vec::new();
        for &op in self.function.operations() {
            let Some(layer) = self.function.layer(op) else {
                continue;
            };
            let Ok(layer) = layer.try_borrow() else {
                continue;
            };
            let nodes = self.function.operation_nodes(op);
            let output_shape = nodes
                .first()
                .map(|node| {
                    node.output_tensors()
                        .iter()
                        .map(|x| x.spec().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_else(|| "?".to_string());
            let parents = nodes
                .iter()
                .flat_map(|node| node.input_tensors())
                .filter_map(|x| x.history())
                .map(|h| {
                    format!("{}[{}][{}]", layer_name(h.operation), h.node_index, h.tensor_index)
                })
                .collect::<Vec<_>>();
            rows.push(SummaryRow {
                name: layer.name().to_string(),
                class_name: layer.class_name().to_string(),
                output_shape,
                params: layer.count_params(),
                trainable: layer.trainable(),
                connected_to: if parents.is_empty() {
                    "-".to_string()
                } else {
                    parents.join(", ")
                },
            });
        }
        rows
    }

    fn param_totals(rows: &[SummaryRow]) -> (usize, usize) {
        let total = rows.iter().map(|r| r.params).sum::<usize>();
        let trainable = rows.iter().filter(|r| r.trainable).map(|r| r.params).sum::<usize>();
        (total, trainable)
    }

    /// 返回模型摘要的 Markdown 格式字符串
    pub fn summary_markdown(&self) -> String {
        let rows = self.summary_rows();
        let mut output = String::new();

        output.push_str(&format!("# 模型摘要: {}\n\n", self.name));
        output.push_str("| 层名称 | 类型 | 输出形状 | 参数量 | 连接到 |\n");
        output.push_str("|--------|------|----------|--------|--------|\n");
        for row in &rows {
            output.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                row.name,
                row.class_name,
                row.output_shape,
                format_number(row.params),
                row.connected_to
            ));
        }

        let (total, trainable) = Self::param_totals(&rows);
        output.push_str(&format!(
            "\n**总参数量**: {}  \n**可训练参数**: {}  \n**不可训练参数**: {}\n",
            format_number(total),
            format_number(trainable),
            format_number(total - trainable)
        ));
        output
    }

    /// 返回模型摘要字符串（Unicode 文本表格，用于控制台输出）
    pub fn summary_string(&self) -> String {
        let rows = self.summary_rows();

        let column_width = |f: &dyn Fn(&SummaryRow) -> usize, min: usize| {
            rows.iter().map(f).max().unwrap_or(min).max(min)
        };
        let name_width = column_width(&|r| display_width(&r.name), 8);
        let type_width = column_width(&|r| r.class_name.len(), 8);
        let shape_width = column_width(&|r| r.output_shape.len(), 8);
        let param_width = 10;
        let connected_width = column_width(&|r| display_width(&r.connected_to), 6);
        let widths = [name_width, type_width, shape_width, param_width, connected_width];
        let total_width = widths.iter().sum::<usize>() + 16;

        let border = |left: &str, middle: &str, right: &str| {
            let segments = widths.iter().map(|w| "─".repeat(w + 2)).collect::<Vec<_>>();
            format!("{left}{}{right}\n", segments.join(middle))
        };

        let mut output = String::new();
        output.push_str(&format!("模型: \"{}\"\n", self.name));
        output.push_str(&border("┌", "┬", "┐"));
        output.push_str(&format!(
            "│ {} │ {} │ {} │ {} │ {} │\n",
            pad("层名称", name_width),
            pad("类型", type_width),
            pad("输出形状", shape_width),
            pad("参数量", param_width),
            pad("连接到", connected_width),
        ));
        output.push_str(&border("├", "┼", "┤"));
        for row in &rows {
            output.push_str(&format!(
                "│ {} │ {:<type_w$} │ {:<shape_w$} │ {:>param_w$} │ {} │\n",
                pad(&row.name, name_width),
                row.class_name,
                row.output_shape,
                format_number(row.params),
                pad(&row.connected_to, connected_width),
                type_w = type_width,
                shape_w = shape_width,
                param_w = param_width,
            ));
        }
        output.push_str(&border("├", "┴", "┤"));

        let (total, trainable) = Self::param_totals(&rows);
        for line in [
            format!("总参数量: {}", format_number(total)),
            format!("可训练参数: {}", format_number(trainable)),
            format!("不可训练参数: {}", format_number(total - trainable)),
        ] {
            output.push_str(&format!("│ {} │\n", pad(&line, total_width - 4)));
        }
        output.push_str(&format!("└{}┘\n", "─".repeat(total_width - 2)));
        output
    }
}

/// 格式化数字为千分位分隔形式
fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// 计算字符串显示宽度（考虑中文字符）
fn display_width(s: &str) -> usize {
    s.chars().map(|c| if c.is_ascii() { 1 } else { 2 }).sum()
}

/// 按显示宽度左对齐
fn pad(s: &str, width: usize) -> String {
    let padding = width.saturating_sub(display_width(s));
    format!("{s}{}", " ".repeat(padding))
}
