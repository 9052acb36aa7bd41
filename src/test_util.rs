//! Catalog fixtures shared by unit tests

use crate::bucket::{DataShape, ElementType, RecordType, Timeframe, TimeBucketInfo};
use std::fs;
use std::path::Path;

pub const CURRENCY_SYMBOLS: [&str; 3] = ["EURUSD", "USDJPY", "NZDUSD"];
pub const TIMEFRAMES: [&str; 6] = ["1Min", "5Min", "15Min", "1H", "4H", "1D"];
pub const YEARS: [i16; 3] = [2000, 2001, 2002];

pub fn ohlc_shapes() -> Vec<DataShape> {
    DataShape::vector(&["Open", "High", "Low", "Close"], &[ElementType::Float32; 4])
}

pub fn ohlcv_shapes() -> Vec<DataShape> {
    DataShape::vector(
        &["Open", "High", "Low", "Close", "Volume"],
        &[
            ElementType::Float32,
            ElementType::Float32,
            ElementType::Float32,
            ElementType::Float32,
            ElementType::Int32,
        ],
    )
}

fn write_marker(dir: &Path, category: &str) {
    fs::write(dir.join("category_name"), category).unwrap();
}

/// Build `root/<symbol>/<timeframe>/OHLC/<year>.bin` for 3 symbols, 6
/// timeframes and 3 years: 54 header-only year files
pub fn make_dummy_currency_dir(root: &Path) {
    write_marker(root, "Symbol");
    for symbol in CURRENCY_SYMBOLS {
        let symbol_dir = root.join(symbol);
        fs::create_dir_all(&symbol_dir).unwrap();
        write_marker(&symbol_dir, "Timeframe");

        for tf_name in TIMEFRAMES {
            let tf_dir = symbol_dir.join(tf_name);
            fs::create_dir_all(&tf_dir).unwrap();
            write_marker(&tf_dir, "AttributeGroup");

            let group_dir = tf_dir.join("OHLC");
            fs::create_dir_all(&group_dir).unwrap();
            write_marker(&group_dir, "Year");

            let tf = Timeframe::parse(tf_name).unwrap();
            for year in YEARS {
                let info = TimeBucketInfo::new(
                    &tf,
                    &group_dir,
                    "Fake fileinfo",
                    year,
                    &ohlc_shapes(),
                    RecordType::Fixed,
                );
                let mut file = fs::File::create(&info.path).unwrap();
                info.write_header(&mut file).unwrap();
            }
        }
    }
}
