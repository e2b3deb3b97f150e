use crate::error::Result;
use crate::model::{columns, str_column, Granularity, IndexedRow, OUTPUT_START_YEAR, TOTAL_TAG};
use crate::regions::region_name;
use polars::prelude::*;

/// Zero-pad a region code to the width of its granularity. National rows
/// always get `"00"`.
pub fn format_region_key(key: &str, granularity: Granularity) -> String {
    match granularity {
        Granularity::Us => "00".to_string(),
        _ => format!("{:0>width$}", key.trim(), width = granularity.key_width()),
    }
}

/// Columns of a shaped frame, in output order.
pub fn output_columns() -> Vec<String> {
    let mut out: Vec<String> = [
        columns::REGION_KEY,
        columns::NAME,
        columns::TYPE,
        columns::CATEGORY,
        columns::PERIOD,
        columns::ACTUALIZATION,
        columns::BF_PER_CAPITA,
        columns::VELOCITY,
        columns::NEWNESS,
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    out.push(format!("{}{}", columns::VELOCITY, columns::NORMALIZED_SUFFIX));
    out.push(format!("{}{}", columns::ACTUALIZATION, columns::NORMALIZED_SUFFIX));
    out.push(columns::INDEX.to_string());
    out
}

/// Format keys, attach names and tags, keep years from 2005 on and sort by
/// (region, period, category). Names come from the static region table,
/// falling back to the source's `region` label.
pub fn shape(mut frame: DataFrame, granularity: Granularity) -> Result<DataFrame> {
    let padded: StringChunked = str_column(&frame, columns::REGION_KEY)?
        .into_iter()
        .map(|key| key.map(|k| format_region_key(k, granularity)))
        .collect();
    let labels: Vec<Option<String>> = match frame.column(columns::REGION) {
        Ok(series) => series.str()?.into_iter().map(|l| l.map(str::to_string)).collect(),
        Err(_) => vec![None; frame.height()],
    };
    let names: StringChunked = padded
        .into_iter()
        .zip(labels)
        .map(|(key, label)| key.and_then(region_name).map(str::to_string).or(label))
        .collect();

    frame.with_column(padded.with_name(columns::REGION_KEY).into_series())?;
    frame.with_column(names.with_name(columns::NAME).into_series())?;

    let selection: Vec<Expr> = output_columns().iter().map(|c| col(c)).collect();
    let shaped = frame
        .lazy()
        .with_columns([
            lit(TOTAL_TAG).alias(columns::CATEGORY),
            lit(TOTAL_TAG).alias(columns::TYPE),
        ])
        .filter(col(columns::PERIOD).gt_eq(lit(OUTPUT_START_YEAR)))
        .sort(
            [columns::REGION_KEY, columns::PERIOD, columns::CATEGORY],
            Default::default(),
        )
        .select(selection)
        .collect()?;

    Ok(shaped)
}

/// Shape and read out typed rows.
pub fn shape_rows(frame: DataFrame, granularity: Granularity) -> Result<Vec<IndexedRow>> {
    let shaped = shape(frame, granularity)?;
    IndexedRow::from_frame(&shaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed() -> DataFrame {
        df![
            "region_key" => ["6", "1", "1", "6"],
            "period" => [2010, 2010, 2004, 2009],
            "region" => [Some("California"), Some("Alabama"), Some("Alabama"), None],
            "actualization" => [0.2, 0.3, 0.4, 0.5],
            "bf_per_capita" => [0.01, 0.02, 0.03, 0.04],
            "velocity" => [Some(4.0), None, Some(5.0), Some(6.0)],
            "newness" => [0.1, 0.2, 0.3, 0.4],
            "velocity_normalized" => [Some(1.0), None, Some(0.9), Some(0.8)],
            "actualization_normalized" => [1.0, 1.1, 1.2, 1.3],
            "index" => [Some(1.0), None, Some(1.0), Some(1.0)]
        ]
        .unwrap()
    }

    #[test]
    fn test_format_region_key() {
        assert_eq!(format_region_key("1", Granularity::State), "01");
        assert_eq!(format_region_key("12", Granularity::State), "12");
        assert_eq!(format_region_key("1001", Granularity::County), "01001");
        assert_eq!(format_region_key("101", Granularity::County), "00101");
        assert_eq!(format_region_key("12", Granularity::Us), "00");
    }

    #[test]
    fn test_shape_state() {
        let rows = shape_rows(indexed(), Granularity::State).unwrap();
        let keys: Vec<(&str, i32)> = rows.iter().map(|r| (r.region_key.as_str(), r.period)).collect();
        assert_eq!(keys, vec![("01", 2010), ("06", 2009), ("06", 2010)]);

        assert_eq!(rows[0].name.as_deref(), Some("Alabama"));
        assert_eq!(rows[0].category, "Total");
        assert_eq!(rows[0].demographic_type, "Total");
        assert_eq!(rows[0].velocity, None);
        assert_eq!(rows[0].index, None);
        assert_eq!(rows[2].name.as_deref(), Some("California"));
        assert_eq!(rows[2].velocity_normalized, Some(1.0));
    }

    #[test]
    fn test_shape_falls_back_to_source_label() {
        let frame = df![
            "region_key" => ["1001", "1003"],
            "period" => [2010, 2010],
            "region" => [Some("Autauga County, Alabama"), None],
            "actualization" => [0.2, 0.3],
            "bf_per_capita" => [0.01, 0.02],
            "velocity" => [4.0, 5.0],
            "newness" => [0.1, 0.2],
            "velocity_normalized" => [1.0, 0.9],
            "actualization_normalized" => [1.0, 1.1],
            "index" => [1.0, 1.0]
        ]
        .unwrap();
        let rows = shape_rows(frame, Granularity::County).unwrap();
        assert_eq!(rows[0].region_key, "01001");
        assert_eq!(rows[0].name.as_deref(), Some("Autauga County, Alabama"));
        assert_eq!(rows[1].region_key, "01003");
        assert_eq!(rows[1].name, None);
    }

    #[test]
    fn test_shape_us_uses_national_key() {
        let rows = shape_rows(indexed(), Granularity::Us).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.region_key == "00"));
        assert!(rows.iter().all(|r| r.name.as_deref() == Some("United States")));
        let periods: Vec<i32> = rows.iter().map(|r| r.period).collect();
        assert_eq!(periods, vec![2009, 2010, 2010]);
    }
}
