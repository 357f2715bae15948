pub fn time_str(sec: f64) -> String {
    let total_ms = (sec * 1000.0) as u64;
    let hours = total_ms / 3_600_000;
    let minutes = total_ms / 60_000 % 60;
    let seconds = total_ms / 1000 % 60;
    let millis = total_ms % 1000;

    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

#[test]
fn formats_hours_minutes_seconds() {
    assert_eq!(time_str(0.0), "00:00:00.000");
    assert_eq!(time_str(61.5), "00:01:01.500");
    assert_eq!(time_str(3723.5), "01:02:03.500");
}
