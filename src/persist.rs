//! The binary model format.
//!
//! A model is written as a magic tag and a format version, followed by the variant tag, every
//! configuration scalar in a fixed order and finally every tensor of the store in layout order.
//! Each tensor is prefixed by its name and length so a model can't be silently loaded into a
//! different topology. Every number is little-endian.

use std::io::{Read, Write};

use log::info;

use crate::{
    LabelerErr, Result,
    config::{HyperParams, TopologyConfig, Variant, VocabDims},
    labeler::Labeler,
    params::{ModelParams, ParameterStore},
};

const MAGIC: &[u8; 4] = b"NLAB";
const VERSION: u32 = 1;

/// Writes `labeler` to `writer`.
///
/// # Arguments
/// * `writer` - Where to write the model to.
/// * `labeler` - The model, its store is read under the shared lock.
pub fn save<W: Write>(writer: &mut W, labeler: &Labeler) -> Result<()> {
    let config = labeler.config();
    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    writer.write_all(&[config.variant().tag()])?;

    let hyper = config.hyper();
    for n in [
        hyper.word_context,
        hyper.char_context,
        hyper.hidden_size,
        hyper.char_hidden_size,
        hyper.layers,
        hyper.max_sentence_length,
        hyper.max_char_length,
    ] {
        write_usize(writer, n)?;
    }
    writer.write_all(&hyper.drop_prob.to_le_bytes())?;
    writer.write_all(&[hyper.seed.is_some() as u8])?;
    writer.write_all(&hyper.seed.unwrap_or_default().to_le_bytes())?;

    let dims = config.dims();
    for n in [dims.word_vocab, dims.word_dim, dims.char_vocab, dims.char_dim, dims.labels] {
        write_usize(writer, n)?;
    }

    let store = labeler.handle().read();
    let layout = store.layout();
    write_usize(writer, layout.tensors())?;

    for (tensor, entry) in layout.iter() {
        write_usize(writer, entry.name.len())?;
        writer.write_all(entry.name.as_bytes())?;

        let values = store.tensor(tensor);
        write_usize(writer, values.len())?;
        write_f32s(writer, values)?;
    }

    writer.flush()?;
    info!(variant = config.variant().name(), tensors = layout.tensors(); "saved model");
    Ok(())
}

/// Reads a model written with [`save`].
///
/// # Returns
/// The model, a `Format` error if the data isn't a model or doesn't fit its own topology, or an
/// `Io` error if the reader fails or ends early.
pub fn load<R: Read>(reader: &mut R) -> Result<Labeler> {
    let mut magic = [0; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(LabelerErr::Format("not a labeler model".to_string()));
    }

    let version = u32::from_le_bytes(read_array(reader)?);
    if version != VERSION {
        return Err(LabelerErr::Format(format!("unsupported model version {version}")));
    }

    let [tag]: [u8; 1] = read_array(reader)?;
    let variant = Variant::from_tag(tag)
        .ok_or_else(|| LabelerErr::Format(format!("unknown variant tag {tag}")))?;

    let hyper = HyperParams {
        word_context: read_usize(reader)?,
        char_context: read_usize(reader)?,
        hidden_size: read_usize(reader)?,
        char_hidden_size: read_usize(reader)?,
        layers: read_usize(reader)?,
        max_sentence_length: read_usize(reader)?,
        max_char_length: read_usize(reader)?,
        drop_prob: f32::from_le_bytes(read_array(reader)?),
        seed: {
            let [flag]: [u8; 1] = read_array(reader)?;
            let seed = u64::from_le_bytes(read_array(reader)?);
            (flag != 0).then_some(seed)
        },
    };

    let dims = VocabDims {
        word_vocab: read_usize(reader)?,
        word_dim: read_usize(reader)?,
        char_vocab: read_usize(reader)?,
        char_dim: read_usize(reader)?,
        labels: read_usize(reader)?,
    };

    let config = TopologyConfig::derive(variant, hyper, dims)?;
    let store = read_store(reader, &config)?;

    info!(variant = variant.name(), params = store.len(); "loaded model");
    Labeler::from_store(config, store)
}

fn read_store<R: Read>(reader: &mut R, config: &TopologyConfig) -> Result<ParameterStore> {
    let (_, layout) = ModelParams::new(config)?;
    let mut store = ParameterStore::new(layout.clone());

    let tensors = read_usize(reader)?;
    if tensors != layout.tensors() {
        return Err(LabelerErr::Format(format!(
            "expected {} tensors, found {tensors}",
            layout.tensors()
        )));
    }

    for (tensor, entry) in layout.iter() {
        let name_len = read_usize(reader)?;
        if name_len != entry.name.len() {
            return Err(LabelerErr::Format(format!(
                "expected tensor '{}', found a name of {name_len} bytes",
                entry.name
            )));
        }

        let mut name = vec![0; name_len];
        reader.read_exact(&mut name)?;
        if name != entry.name.as_bytes() {
            return Err(LabelerErr::Format(format!(
                "expected tensor '{}', found '{}'",
                entry.name,
                String::from_utf8_lossy(&name)
            )));
        }

        let len = read_usize(reader)?;
        if len != entry.shape.len() {
            return Err(LabelerErr::Format(format!(
                "tensor '{}' has {len} values, expected {}",
                entry.name,
                entry.shape.len()
            )));
        }

        read_f32s(reader, store.tensor_mut(tensor))?;
    }

    Ok(store)
}

fn write_usize<W: Write>(writer: &mut W, n: usize) -> Result<()> {
    writer.write_all(&(n as u64).to_le_bytes())?;
    Ok(())
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut buf = [0; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_usize<R: Read>(reader: &mut R) -> Result<usize> {
    let n = u64::from_le_bytes(read_array(reader)?);
    usize::try_from(n).map_err(|_| LabelerErr::Format(format!("size {n} doesn't fit in memory")))
}

fn write_f32s<W: Write>(writer: &mut W, values: &[f32]) -> Result<()> {
    if cfg!(target_endian = "little") {
        writer.write_all(bytemuck::cast_slice(values))?;
    } else {
        for v in values {
            writer.write_all(&v.to_le_bytes())?;
        }
    }
    Ok(())
}

fn read_f32s<R: Read>(reader: &mut R, dst: &mut [f32]) -> Result<()> {
    reader.read_exact(bytemuck::cast_slice_mut(dst))?;
    if cfg!(target_endian = "big") {
        dst.iter_mut().for_each(|v| *v = f32::from_bits(u32::from_le(v.to_bits())));
    }
    Ok(())
}
