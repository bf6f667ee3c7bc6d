//! Tensor I/O: safetensors loading/saving of parameter stores and embedding
//! tables, buffered or memory-mapped.
//!
//! Every tensor is held as f32 in memory. Loading widens F16, BF16, I32 and
//! I64 data to f32; saving always writes F32.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use half::{bf16, f16};
use memmap2::Mmap;
use safetensors::SafeTensors;
use safetensors::tensor::TensorView;
use tracing::debug;

use tessera_core::{Result, Shape, Tensor, TesseraError};
use tessera_nn::{Embed, ParamStore, VECTORS};

/// Load all tensors from a safetensors file into memory.
pub fn load_safetensors(path: &Path) -> Result<HashMap<String, Tensor>> {
    let data = fs::read(path)?;
    let st = SafeTensors::deserialize(&data).map_err(parse_error)?;
    deserialize_tensors(&st)
}

/// Load all tensors from a safetensors file using memory-mapped I/O.
pub fn load_safetensors_mmap(path: &Path) -> Result<HashMap<String, Tensor>> {
    let file = fs::File::open(path)?;
    // SAFETY: The file must not be modified while the mmap is alive. Tables
    // are copied out before returning, so the map never outlives this call.
    let mmap = unsafe { Mmap::map(&file)? };
    let st = SafeTensors::deserialize(&mmap).map_err(parse_error)?;
    deserialize_tensors(&st)
}

/// Save tensors to a safetensors file as F32.
pub fn save_safetensors(path: &Path, tensors: &HashMap<String, Tensor>) -> Result<()> {
    let mut names: Vec<&String> = tensors.keys().collect();
    names.sort();

    let encoded: Vec<(&str, Vec<u8>, Vec<usize>)> = names
        .into_iter()
        .map(|name| {
            let t = &tensors[name];
            let bytes = t.as_slice().iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.as_str(), bytes, t.shape().dims().to_vec())
        })
        .collect();

    let views = encoded
        .iter()
        .map(|(name, bytes, shape)| {
            TensorView::new(safetensors::Dtype::F32, shape.clone(), bytes)
                .map(|view| (*name, view))
                .map_err(|e| {
                    TesseraError::InvalidArgument(format!("safetensors view for {name}: {e}"))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    safetensors::serialize_to_file(views, &None, path)
        .map_err(|e| TesseraError::InvalidArgument(format!("safetensors save error: {e}")))?;
    debug!(path = %path.display(), count = tensors.len(), "saved safetensors");
    Ok(())
}

/// Save every parameter of `store` that holds a value. Unset slots are
/// skipped.
pub fn save_params(path: &Path, store: &ParamStore) -> Result<()> {
    let mut tensors = HashMap::new();
    for name in store.param_names() {
        if store.has_param(&name) {
            let value = store.get_param(&name)?;
            tensors.insert(name, value);
        }
    }
    save_safetensors(path, &tensors)
}

/// Install the `"vectors"` table from `path` into `embed`, resolving or
/// checking its `nV`/`nO`.
pub fn load_embed(path: &Path, embed: &mut Embed) -> Result<()> {
    let mut tensors = load_safetensors(path)?;
    let table = tensors
        .remove(VECTORS)
        .ok_or_else(|| TesseraError::MissingParam(VECTORS.to_string()))?;
    embed.set_vectors(table)
}

fn parse_error(e: safetensors::SafeTensorError) -> TesseraError {
    TesseraError::InvalidArgument(format!("safetensors parse error: {e}"))
}

fn deserialize_tensors(st: &SafeTensors<'_>) -> Result<HashMap<String, Tensor>> {
    let mut result = HashMap::new();
    for (name, view) in st.tensors() {
        let shape = Shape::new(view.shape());
        let data = convert_to_f32(view.dtype(), view.data())?;
        let tensor = Tensor::from_vec(data, &shape)?;
        result.insert(name, tensor);
    }
    Ok(result)
}

fn convert_to_f32(dtype: safetensors::Dtype, data: &[u8]) -> Result<Vec<f32>> {
    match dtype {
        safetensors::Dtype::F32 => Ok(data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()),
        safetensors::Dtype::F16 => Ok(data
            .chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect()),
        safetensors::Dtype::BF16 => Ok(data
            .chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect()),
        safetensors::Dtype::I32 => Ok(data
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
            .collect()),
        safetensors::Dtype::I64 => Ok(data
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect()),
        other => Err(TesseraError::InvalidArgument(format!(
            "unsupported safetensors dtype: {other:?}"
        ))),
    }
}
