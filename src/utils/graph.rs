/// Renders values as a vertical ASCII bar chart, tallest bar `height` rows high.
pub fn bar_chart(values: &[i64], height: usize) -> String {
    if values.is_empty() {
        return "No data to display".to_string();
    }

    let max = values.iter().copied().max().unwrap_or(0).max(1);
    let height = height.max(1);
    let mut chart = String::new();

    for row in (1..=height).rev() {
        let label = max * row as i64 / height as i64;
        chart.push_str(&format!("{:>4} │ ", label));
        for value in values {
            let bar = (value.max(&0) * height as i64 / max) as usize;
            chart.push_str(if bar >= row { "██ " } else { "   " });
        }
        chart.push('\n');
    }

    chart.push_str(&format!("     └{}\n", "─".repeat(values.len() * 3 + 1)));
    chart.push_str("       ");
    for index in 1..=values.len() {
        chart.push_str(&format!("{:<3}", index));
    }

    chart
}
