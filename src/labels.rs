use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

/// One row of the labels file: class name plus the color used when drawing
/// its bounding boxes. Row order matches the model's class ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLabel {
    pub name: String,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// Loads class labels from a `label, r, g, b` file, one class per line.
pub fn load_class_labels(filepath: &Path) -> io::Result<Vec<ClassLabel>> {
    let file = File::open(filepath)?;
    parse_class_labels(BufReader::new(file))
}

fn parse_class_labels<R: BufRead>(reader: R) -> io::Result<Vec<ClassLabel>> {
    let mut class_labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid line format: {}", line),
            ));
        }

        class_labels.push(ClassLabel {
            name: parts[0].trim().to_string(),
            red: parse_channel(parts[1], "red")?,
            green: parse_channel(parts[2], "green")?,
            blue: parse_channel(parts[3], "blue")?,
        });
    }

    Ok(class_labels)
}

fn parse_channel(raw: &str, channel: &str) -> io::Result<u8> {
    raw.trim().parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid {} value: {}", channel, raw.trim()),
        )
    })
}

/// Display name for a class id, with a synthetic fallback for ids outside
/// the label table.
pub fn class_name(labels: &[ClassLabel], class_id: usize) -> String {
    labels
        .get(class_id)
        .map(|label| label.name.clone())
        .unwrap_or_else(|| format!("class_{}", class_id))
}
