use crate::core::io::traits::StructureFile;
use crate::core::models::structure::{Structure, StructureError};
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;
use thiserror::Error;

const DEFAULT_PROPERTIES: &str = "species:S:1:pos:R:3";

/// Data carried by one extended-XYZ frame besides the geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMetadata {
    pub energy: Option<f64>,
    pub forces: Option<Vec<Vector3<f64>>>,
    pub step: Option<usize>,
}

#[derive(Debug, Error)]
pub enum ExtXyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: ExtXyzParseErrorKind,
    },
    #[error("Invalid structure: {0}")]
    Structure(#[from] StructureError),
    #[error("Inconsistent data: {0}")]
    Inconsistency(String),
}

#[derive(Debug, Error)]
pub enum ExtXyzParseErrorKind {
    #[error("Invalid atom count '{0}'")]
    InvalidAtomCount(String),
    #[error("Unexpected end of file (expected {expected} more lines)")]
    UnexpectedEof { expected: usize },
    #[error("Unterminated quoted value in comment line")]
    UnterminatedQuote,
    #[error("Invalid Properties specification '{0}'")]
    InvalidProperties(String),
    #[error("Properties specification lacks the '{0}' column")]
    MissingColumn(&'static str),
    #[error("Invalid float '{value}' for field '{field}'")]
    InvalidFloat { field: String, value: String },
    #[error("Lattice must contain 9 numbers, found {0}")]
    InvalidLattice(usize),
    #[error("Atom line has {found} columns, expected {expected}")]
    ColumnCount { expected: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq)]
struct PropertyColumn {
    name: String,
    count: usize,
    offset: usize,
}

/// Extended XYZ reader/writer (the ASE flavor: `Lattice`, `Properties`, `pbc`, `energy`).
pub struct ExtXyzFile;

impl ExtXyzFile {
    /// Reads every frame of a (possibly multi-frame) extended-XYZ stream.
    pub fn read_frames(
        reader: &mut impl BufRead,
    ) -> Result<Vec<(Structure, FrameMetadata)>, ExtXyzError> {
        let mut lines = reader.lines().peekable();
        let mut line_num = 0;
        let mut frames = Vec::new();
        while let Some(frame) = read_frame(&mut lines, &mut line_num)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    pub fn read_frames_from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<Vec<(Structure, FrameMetadata)>, ExtXyzError> {
        let file = File::open(path)?;
        Self::read_frames(&mut BufReader::new(file))
    }

    /// Writes a trajectory, one frame after the other, creating missing parent directories.
    pub fn write_frames_to_path<P: AsRef<Path>>(
        frames: &[(Structure, FrameMetadata)],
        path: P,
    ) -> Result<(), ExtXyzError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        for (structure, metadata) in frames {
            Self::write_to(structure, metadata, &mut writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl StructureFile for ExtXyzFile {
    type Metadata = FrameMetadata;
    type Error = ExtXyzError;

    fn read_from(reader: &mut impl BufRead) -> Result<(Structure, Self::Metadata), Self::Error> {
        let mut lines = reader.lines().peekable();
        let mut line_num = 0;
        read_frame(&mut lines, &mut line_num)?.ok_or_else(|| ExtXyzError::Parse {
            line: 1,
            kind: ExtXyzParseErrorKind::UnexpectedEof { expected: 2 },
        })
    }

    fn write_to(
        structure: &Structure,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        if let Some(forces) = &metadata.forces {
            if forces.len() != structure.len() {
                return Err(ExtXyzError::Inconsistency(format!(
                    "{} force vectors for {} atoms",
                    forces.len(),
                    structure.len()
                )));
            }
        }

        writeln!(writer, "{}", structure.len())?;

        let mut comment = Vec::new();
        let cell = structure.cell();
        if cell.iter().any(|v| v.norm() > 0.0) {
            let lattice = cell
                .iter()
                .flat_map(|v| v.iter())
                .map(|x| format!("{x:.8}"))
                .collect::<Vec<_>>()
                .join(" ");
            comment.push(format!("Lattice=\"{lattice}\""));
        }
        let mut properties = DEFAULT_PROPERTIES.to_string();
        if metadata.forces.is_some() {
            properties.push_str(":forces:R:3");
        }
        let constrained = !structure.fixed_indices().is_empty();
        if constrained {
            properties.push_str(":move_mask:L:1");
        }
        comment.push(format!("Properties={properties}"));
        if let Some(energy) = metadata.energy {
            comment.push(format!("energy={energy:.10}"));
        }
        if let Some(step) = metadata.step {
            comment.push(format!("step={step}"));
        }
        let pbc = structure
            .pbc()
            .iter()
            .map(|&p| if p { "T" } else { "F" })
            .collect::<Vec<_>>()
            .join(" ");
        comment.push(format!("pbc=\"{pbc}\""));
        writeln!(writer, "{}", comment.join(" "))?;

        for (i, (symbol, position)) in structure
            .symbols()
            .iter()
            .zip(structure.positions())
            .enumerate()
        {
            write!(
                writer,
                "{:<2} {:>16.8} {:>16.8} {:>16.8}",
                symbol, position.x, position.y, position.z
            )?;
            if let Some(forces) = &metadata.forces {
                let f = forces[i];
                write!(writer, " {:>16.8} {:>16.8} {:>16.8}", f.x, f.y, f.z)?;
            }
            if constrained {
                write!(writer, " {}", if structure.is_fixed(i) { "F" } else { "T" })?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    fn write_structure_to(
        structure: &Structure,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        Self::write_to(structure, &FrameMetadata::default(), writer)
    }
}

type LineIter<'a, R> = Peekable<Lines<&'a mut R>>;

fn read_frame<R: BufRead>(
    lines: &mut LineIter<'_, R>,
    line_num: &mut usize,
) -> Result<Option<(Structure, FrameMetadata)>, ExtXyzError> {
    // Skip blank separator lines between frames.
    let count_line = loop {
        match lines.next() {
            None => return Ok(None),
            Some(line) => {
                *line_num += 1;
                let line = line?;
                if !line.trim().is_empty() {
                    break line;
                }
            }
        }
    };
    let parse_err = |line: usize, kind| ExtXyzError::Parse { line, kind };

    let count: usize = count_line.trim().parse().map_err(|_| {
        parse_err(
            *line_num,
            ExtXyzParseErrorKind::InvalidAtomCount(count_line.trim().to_string()),
        )
    })?;

    let comment = match lines.next() {
        Some(line) => {
            *line_num += 1;
            line?
        }
        None => {
            return Err(parse_err(
                *line_num + 1,
                ExtXyzParseErrorKind::UnexpectedEof {
                    expected: count + 1,
                },
            ));
        }
    };
    let comment_line = *line_num;
    let fields = parse_comment(&comment).map_err(|kind| parse_err(comment_line, kind))?;
    let columns = parse_properties(
        fields
            .get("properties")
            .map(String::as_str)
            .unwrap_or(DEFAULT_PROPERTIES),
    )
    .map_err(|kind| parse_err(comment_line, kind))?;

    let species_col = find_column(&columns, "species").map_err(|k| parse_err(comment_line, k))?;
    let pos_col = find_column(&columns, "pos").map_err(|k| parse_err(comment_line, k))?;
    let forces_col = columns.iter().find(|c| c.name == "forces");
    let mask_col = columns.iter().find(|c| c.name == "move_mask");
    let width: usize = columns.iter().map(|c| c.count).sum();

    let mut symbols = Vec::with_capacity(count);
    let mut positions = Vec::with_capacity(count);
    let mut forces = forces_col.map(|_| Vec::with_capacity(count));
    let mut fixed = Vec::new();

    for atom in 0..count {
        let line = match lines.next() {
            Some(line) => {
                *line_num += 1;
                line?
            }
            None => {
                return Err(parse_err(
                    *line_num + 1,
                    ExtXyzParseErrorKind::UnexpectedEof {
                        expected: count - atom,
                    },
                ));
            }
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < width {
            return Err(parse_err(
                *line_num,
                ExtXyzParseErrorKind::ColumnCount {
                    expected: width,
                    found: tokens.len(),
                },
            ));
        }
        symbols.push(tokens[species_col.offset].to_string());
        let pos = parse_vector(&tokens[pos_col.offset..pos_col.offset + 3], "pos")
            .map_err(|k| parse_err(*line_num, k))?;
        positions.push(Point3::from(pos));
        if let (Some(col), Some(forces)) = (forces_col, forces.as_mut()) {
            let f = parse_vector(&tokens[col.offset..col.offset + 3], "forces")
                .map_err(|k| parse_err(*line_num, k))?;
            forces.push(f);
        }
        if let Some(col) = mask_col {
            if parse_bool(tokens[col.offset]) == Some(false) {
                fixed.push(atom);
            }
        }
    }

    let mut structure = Structure::new(symbols, positions)?;
    let cell = match fields.get("lattice") {
        Some(lattice) => parse_lattice(lattice).map_err(|k| parse_err(comment_line, k))?,
        None => *structure.cell(),
    };
    let pbc = fields
        .get("pbc")
        .map(|value| parse_pbc(value))
        .unwrap_or_else(|| [fields.contains_key("lattice"); 3]);
    structure = structure.with_cell(cell, pbc);
    structure.fix_atoms(&fixed)?;

    let energy = match fields.get("energy") {
        Some(value) => Some(parse_float(value, "energy").map_err(|k| parse_err(comment_line, k))?),
        None => None,
    };
    let step = fields.get("step").and_then(|value| value.parse().ok());

    Ok(Some((
        structure,
        FrameMetadata {
            energy,
            forces,
            step,
        },
    )))
}

fn parse_comment(line: &str) -> Result<HashMap<String, String>, ExtXyzParseErrorKind> {
    let mut fields = HashMap::new();
    let mut chars = line.trim().chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }
        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        let value = if chars.next_if_eq(&'=').is_some() {
            read_value(&mut chars)?
        } else {
            "T".to_string()
        };
        fields.insert(key.to_ascii_lowercase(), value);
    }
    Ok(fields)
}

fn read_value(chars: &mut Peekable<Chars<'_>>) -> Result<String, ExtXyzParseErrorKind> {
    let mut value = String::new();
    if chars.next_if_eq(&'"').is_some() {
        loop {
            match chars.next() {
                Some('"') => return Ok(value),
                Some(c) => value.push(c),
                None => return Err(ExtXyzParseErrorKind::UnterminatedQuote),
            }
        }
    }
    while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
        value.push(c);
    }
    Ok(value)
}

fn parse_properties(spec: &str) -> Result<Vec<PropertyColumn>, ExtXyzParseErrorKind> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() % 3 != 0 {
        return Err(ExtXyzParseErrorKind::InvalidProperties(spec.to_string()));
    }
    let mut columns = Vec::with_capacity(parts.len() / 3);
    let mut offset = 0;
    for chunk in parts.chunks(3) {
        let count: usize = chunk[2]
            .parse()
            .map_err(|_| ExtXyzParseErrorKind::InvalidProperties(spec.to_string()))?;
        columns.push(PropertyColumn {
            name: chunk[0].to_string(),
            count,
            offset,
        });
        offset += count;
    }
    Ok(columns)
}

fn find_column<'a>(
    columns: &'a [PropertyColumn],
    name: &'static str,
) -> Result<&'a PropertyColumn, ExtXyzParseErrorKind> {
    columns
        .iter()
        .find(|c| c.name == name)
        .ok_or(ExtXyzParseErrorKind::MissingColumn(name))
}

fn parse_float(value: &str, field: &str) -> Result<f64, ExtXyzParseErrorKind> {
    value
        .parse()
        .map_err(|_| ExtXyzParseErrorKind::InvalidFloat {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn parse_vector(tokens: &[&str], field: &str) -> Result<Vector3<f64>, ExtXyzParseErrorKind> {
    Ok(Vector3::new(
        parse_float(tokens[0], field)?,
        parse_float(tokens[1], field)?,
        parse_float(tokens[2], field)?,
    ))
}

fn parse_lattice(value: &str) -> Result<[Vector3<f64>; 3], ExtXyzParseErrorKind> {
    let numbers = value
        .split_whitespace()
        .map(|token| parse_float(token, "Lattice"))
        .collect::<Result<Vec<_>, _>>()?;
    if numbers.len() != 9 {
        return Err(ExtXyzParseErrorKind::InvalidLattice(numbers.len()));
    }
    Ok([
        Vector3::new(numbers[0], numbers[1], numbers[2]),
        Vector3::new(numbers[3], numbers[4], numbers[5]),
        Vector3::new(numbers[6], numbers[7], numbers[8]),
    ])
}

fn parse_bool(token: &str) -> Option<bool> {
    match token {
        "T" | "True" | "true" | "1" => Some(true),
        "F" | "False" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_pbc(value: &str) -> [bool; 3] {
    let flags: Vec<bool> = value
        .split_whitespace()
        .map(|token| parse_bool(token).unwrap_or(false))
        .collect();
    match flags.as_slice() {
        [single] => [*single; 3],
        [a, b, c, ..] => [*a, *b, *c],
        _ => [false; 3],
    }
}
