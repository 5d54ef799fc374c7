use std::io::{BufRead, BufReader, Read, Write};

use log::error;

use super::StoreError;

/// Ordered `key: value` lines.
pub type KeyValues = Vec<(String, String)>;

pub fn read(input: impl Read, table: &str) -> Result<KeyValues, StoreError> {
    let corrupt = |reason: &str| {
        error!("{table}: {reason}");
        StoreError::Corrupt {
            table: table.into(),
            reason: reason.into(),
        }
    };

    let mut kv = Vec::new();

    for line in BufReader::new(input).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let (k, v) = line
            .split_once(':')
            .ok_or_else(|| corrupt("invalid line, can't split"))?;

        let v = v
            .strip_prefix(' ')
            .ok_or_else(|| corrupt("invalid line - no whitespace after colon"))?;

        kv.push((k.into(), v.into()));
    }

    Ok(kv)
}

pub fn write(mut output: impl Write, keyvalues: &[(String, String)]) -> Result<(), std::io::Error> {
    for (k, v) in keyvalues {
        writeln!(output, "{}: {}", k, v)?;
    }
    Ok(())
}
