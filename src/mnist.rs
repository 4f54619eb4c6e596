use crate::error::{Error, FormatErrorKind, Result};
use flate2::read::GzDecoder;
use itertools::Itertools;
use log::debug;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

/// Schema shared by every sample of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetShape {
    pub pixel_count: usize,
    pub num_classes: usize,
}

impl DatasetShape {
    /// 28x28 greyscale digits, ten classes.
    pub const MNIST: DatasetShape = DatasetShape {
        pixel_count: 28 * 28,
        num_classes: 10,
    };
}

impl Default for DatasetShape {
    fn default() -> Self {
        DatasetShape::MNIST
    }
}

// An immutable, fully in-memory dataset. Each row of `inputs` is one sample whose intensities have
// been scaled from [0, 255] down to [0, 1], and `labels[i]` is the class of row i.
#[derive(Debug, Clone)]
pub struct MnistDataset {
    shape: DatasetShape,
    inputs: Array2<f32>,
    labels: Vec<usize>,
}

impl MnistDataset {
    /// Reads a CSV dataset (`label,p0,p1,...` after one header line). Paths ending in `.gz` are
    /// decompressed first.
    pub fn load<P: AsRef<Path>>(path: P, shape: DatasetShape) -> Result<MnistDataset> {
        let path = path.as_ref();
        let text = read_text(path)?;
        let dataset = MnistDataset::parse(&text, shape, path)?;

        debug!(
            "loaded {} samples of {} pixels from {}",
            dataset.len(),
            shape.pixel_count,
            path.display()
        );
        Ok(dataset)
    }

    // Parse the text of a dataset file. `origin` is only used to label errors. The first line is the
    // header and is skipped no matter what it contains; an input without even that line is
    // malformed. Blank rows are skipped, every other row must have exactly 1 + pixel_count fields.
    pub fn parse(text: &str, shape: DatasetShape, origin: &Path) -> Result<MnistDataset> {
        let format_error = |line: usize, kind: FormatErrorKind| Error::Format {
            path: origin.to_path_buf(),
            line,
            kind,
        };

        let mut lines = text.lines().enumerate();
        if lines.next().is_none() {
            return Err(format_error(1, FormatErrorKind::MissingHeader));
        }

        let expected_fields = shape.pixel_count + 1;
        let mut pixels = Vec::new();
        let mut labels = Vec::new();

        for (index, line) in lines {
            let line_number = index + 1;
            if line.trim().is_empty() {
                continue;
            }

            let fields = line.split(',').map(str::trim).collect_vec();
            if fields.len() != expected_fields {
                return Err(format_error(
                    line_number,
                    FormatErrorKind::FieldCount {
                        expected: expected_fields,
                        found: fields.len(),
                    },
                ));
            }

            let label = fields[0].parse::<usize>().map_err(|_| {
                format_error(
                    line_number,
                    FormatErrorKind::InvalidLabel {
                        value: fields[0].to_string(),
                    },
                )
            })?;

            for (field, value) in fields.iter().enumerate().skip(1) {
                let intensity = value
                    .parse::<f32>()
                    .ok()
                    .filter(|intensity| intensity.is_finite())
                    .ok_or_else(|| {
                        format_error(
                            line_number,
                            FormatErrorKind::InvalidIntensity {
                                field,
                                value: value.to_string(),
                            },
                        )
                    })?;
                pixels.push(intensity / 255.0);
            }
            labels.push(label);
        }

        let found = pixels.len();
        let inputs = Array2::from_shape_vec((labels.len(), shape.pixel_count), pixels).map_err(
            |_| Error::ShapeMismatch {
                what: "pixel buffer",
                expected: labels.len() * shape.pixel_count,
                found,
            },
        )?;

        Ok(MnistDataset {
            shape,
            inputs,
            labels,
        })
    }

    // Build a dataset from already-normalized rows. Used for synthetic data; the width of `inputs`
    // becomes the pixel count.
    pub fn from_parts(
        inputs: Array2<f32>,
        labels: Vec<usize>,
        num_classes: usize,
    ) -> Result<MnistDataset> {
        if inputs.nrows() != labels.len() {
            return Err(Error::ShapeMismatch {
                what: "label count",
                expected: inputs.nrows(),
                found: labels.len(),
            });
        }

        Ok(MnistDataset {
            shape: DatasetShape {
                pixel_count: inputs.ncols(),
                num_classes,
            },
            inputs,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn shape(&self) -> DatasetShape {
        self.shape
    }

    pub fn inputs(&self) -> ArrayView2<'_, f32> {
        self.inputs.view()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn sample(&self, index: usize) -> (ArrayView1<'_, f32>, usize) {
        (self.inputs.row(index), self.labels[index])
    }

    // Copy the rows named by `indices` into a fresh [indices.len() x pixel_count] input matrix along
    // with their labels, in the order given.
    pub fn gather(&self, indices: &[usize]) -> (Array2<f32>, Vec<usize>) {
        let inputs = self.inputs.select(Axis(0), indices);
        let labels = indices.iter().map(|&index| self.labels[index]).collect();
        (inputs, labels)
    }
}

// Read a whole file into memory, gunzipping it on the way if it has a `.gz` extension. The file is
// closed again before this returns.
fn read_text(path: &Path) -> Result<String> {
    let io_error = |source| Error::Io {
        path: PathBuf::from(path),
        source,
    };

    let mut file = File::open(path).map_err(io_error)?;
    let mut text = String::new();
    if path.extension().is_some_and(|extension| extension == "gz") {
        GzDecoder::new(file)
            .read_to_string(&mut text)
            .map_err(io_error)?;
    } else {
        file.read_to_string(&mut text).map_err(io_error)?;
    }

    Ok(text)
}
