//! Checkpoint file formats and the reader for pre-1.6 PyTorch files.
//!
//! A legacy `torch.save` file is a run of pickles: the magic number, the
//! protocol version, system info, the saved object (whose tensors name their
//! storages by persistent id) and the list of storage keys. The raw storages
//! follow in that order, each prefixed by its element count as a
//! little-endian `i64`.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use candle_core::pickle::{Object, Stack};
use candle_core::{DType, Device, Tensor};
use tracing::debug;

use crate::error::{ModelError, Result};

/// `pickle.dumps(0x1950a86a20f9469cfc6c, protocol=2)`
pub const LEGACY_MAGIC: [u8; 15] = [
    0x80, 0x02, 0x8a, 0x0a, 0x6c, 0xfc, 0x9c, 0x46, 0xf9, 0x20, 0x6a, 0xa8, 0x50, 0x19, 0x2e,
];

pub const LEGACY_PROTOCOL_VERSION: i64 = 1001;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    Safetensors,
    /// `torch.save` from PyTorch 1.6 on
    TorchZip,
    /// `torch.save` before PyTorch 1.6
    TorchLegacy,
}

impl CheckpointFormat {
    /// Decide by extension for safetensors, by leading bytes otherwise.
    pub fn detect(path: &Path) -> Result<Self> {
        if path.extension().map(|e| e == "safetensors").unwrap_or(false) {
            return Ok(Self::Safetensors);
        }
        let mut head = Vec::with_capacity(LEGACY_MAGIC.len());
        std::fs::File::open(path)?
            .take(LEGACY_MAGIC.len() as u64)
            .read_to_end(&mut head)?;
        if head.starts_with(ZIP_MAGIC) {
            Ok(Self::TorchZip)
        } else if head == LEGACY_MAGIC {
            Ok(Self::TorchLegacy)
        } else {
            Err(load_error(path, "unrecognised checkpoint format"))
        }
    }
}

fn load_error(path: &Path, reason: impl std::fmt::Display) -> ModelError {
    ModelError::ModelLoad(format!("{:?}: {}", path, reason))
}

#[derive(Debug, Clone)]
struct StorageRef {
    dtype: Option<DType>,
    elem_size: usize,
}

#[derive(Debug, Clone)]
struct TensorRef {
    storage: String,
    offset: usize,
    size: Vec<usize>,
    stride: Vec<usize>,
}

/// Element type and width of a `torch.*Storage` class. Storages candle has
/// no dtype for are read past but never turned into tensors.
fn storage_kind(class_name: &str) -> Option<(Option<DType>, usize)> {
    Some(match class_name {
        "FloatStorage" => (Some(DType::F32), 4),
        "DoubleStorage" => (Some(DType::F64), 8),
        "HalfStorage" => (Some(DType::F16), 2),
        "BFloat16Storage" => (Some(DType::BF16), 2),
        "LongStorage" => (Some(DType::I64), 8),
        "ByteStorage" => (Some(DType::U8), 1),
        "IntStorage" => (None, 4),
        "ShortStorage" => (None, 2),
        "CharStorage" | "BoolStorage" => (None, 1),
        _ => return None,
    })
}

/// `('storage', torch.FloatStorage, key, location, numel, view_metadata)`
fn storage_ref(id: &Object) -> Option<(String, StorageRef)> {
    let Object::Tuple(fields) = id else {
        return None;
    };
    match (fields.first(), fields.get(1), fields.get(2)) {
        (Some(Object::Unicode(tag)), Some(Object::Class { class_name, .. }), Some(Object::Unicode(key)))
            if tag == "storage" =>
        {
            let (dtype, elem_size) = storage_kind(class_name)?;
            Some((key.clone(), StorageRef { dtype, elem_size }))
        }
        _ => None,
    }
}

/// Every storage referenced anywhere in `obj`.
fn collect_storages(obj: &Object, out: &mut HashMap<String, StorageRef>) {
    match obj {
        Object::PersistentLoad(id) => {
            if let Some((key, storage)) = storage_ref(id) {
                out.insert(key, storage);
            }
        }
        Object::Tuple(items) | Object::List(items) => items.iter().for_each(|o| collect_storages(o, out)),
        Object::Dict(entries) => entries.iter().for_each(|(k, v)| {
            collect_storages(k, out);
            collect_storages(v, out);
        }),
        Object::Reduce { callable, args } | Object::Build { callable, args } => {
            collect_storages(callable, out);
            collect_storages(args, out);
        }
        _ => {}
    }
}

fn dims(obj: Object) -> Option<Vec<usize>> {
    match obj {
        Object::Tuple(items) => items
            .into_iter()
            .map(|o| o.int_or_long().ok().and_then(|v| usize::try_from(v).ok()))
            .collect(),
        _ => None,
    }
}

fn is_class(obj: &Object, module: &str, class: &str) -> bool {
    matches!(obj, Object::Class { module_name, class_name } if module_name == module && class_name == class)
}

/// `_rebuild_tensor_v2(storage, offset, size, stride, ...)`, possibly
/// wrapped in `_rebuild_parameter`.
fn tensor_ref(value: Object) -> Option<TensorRef> {
    let (callable, args) = value.reduce().ok()?;
    let (callable, args) = if is_class(&callable, "torch._utils", "_rebuild_parameter") {
        args.tuple().ok()?.into_iter().next()?.reduce().ok()?
    } else {
        (callable, args)
    };
    if !is_class(&callable, "torch._utils", "_rebuild_tensor_v2") {
        return None;
    }

    let mut args = args.tuple().ok()?.into_iter();
    let id = args.next()?.persistent_load().ok()?;
    let (storage, _) = storage_ref(&id)?;
    let offset = usize::try_from(args.next()?.int_or_long().ok()?).ok()?;
    let size = dims(args.next()?)?;
    let stride = dims(args.next()?)?;
    Some(TensorRef {
        storage,
        offset,
        size,
        stride,
    })
}

fn is_row_major(size: &[usize], stride: &[usize]) -> bool {
    if size.len() != stride.len() {
        return false;
    }
    let mut expected = 1;
    for (&dim, &step) in size.iter().zip(stride).rev() {
        if dim > 1 && step != expected {
            return false;
        }
        expected *= dim;
    }
    true
}

fn read_pickle<R: BufRead>(reader: &mut R, path: &Path) -> Result<Object> {
    let mut stack = Stack::empty();
    stack.read_loop(reader).map_err(|e| load_error(path, e))?;
    stack.finalize().map_err(|e| load_error(path, e))
}

fn is_key(obj: &Object, key: &str) -> bool {
    matches!(obj, Object::Unicode(s) if s == key)
}

/// Read the tensors of a legacy checkpoint on the CPU.
///
/// With `key`, a top-level dict holding that key is descended into first;
/// otherwise the saved object itself must be the state dict.
pub fn read_legacy(path: &Path, key: Option<&str>) -> Result<HashMap<String, Tensor>> {
    let mut reader = BufReader::new(std::fs::File::open(path)?);

    let mut magic = [0u8; LEGACY_MAGIC.len()];
    reader.read_exact(&mut magic)?;
    if magic != LEGACY_MAGIC {
        return Err(load_error(path, "missing legacy PyTorch magic number"));
    }
    let protocol = read_pickle(&mut reader, path)?
        .int_or_long()
        .map_err(|o| load_error(path, format!("bad protocol version {:?}", o)))?;
    if protocol != LEGACY_PROTOCOL_VERSION {
        return Err(load_error(path, format!("unsupported protocol version {}", protocol)));
    }
    let _sys_info = read_pickle(&mut reader, path)?;
    let root = read_pickle(&mut reader, path)?;
    let keys = match read_pickle(&mut reader, path)? {
        Object::List(keys) => keys
            .into_iter()
            .map(|k| k.unicode().map_err(|o| load_error(path, format!("bad storage key {:?}", o))))
            .collect::<Result<Vec<_>>>()?,
        other => return Err(load_error(path, format!("expected storage key list, got {:?}", other))),
    };

    let mut refs = HashMap::new();
    collect_storages(&root, &mut refs);

    let mut storages = HashMap::with_capacity(keys.len());
    for key in keys {
        let storage = refs
            .get(&key)
            .ok_or_else(|| load_error(path, format!("storage {} is not referenced", key)))?;
        let mut count = [0u8; 8];
        reader.read_exact(&mut count)?;
        let count = usize::try_from(i64::from_le_bytes(count))
            .map_err(|_| load_error(path, format!("negative size for storage {}", key)))?;
        let mut bytes = vec![0u8; count * storage.elem_size];
        reader.read_exact(&mut bytes)?;
        if let Some(dtype) = storage.dtype {
            storages.insert(key, Tensor::from_raw_buffer(&bytes, dtype, &[count], &Device::Cpu)?);
        }
    }

    let state = match (root, key) {
        (Object::Dict(mut entries), Some(key)) => match entries.iter().position(|(k, _)| is_key(k, key)) {
            Some(i) => entries.swap_remove(i).1,
            None => Object::Dict(entries),
        },
        (root, _) => root,
    };
    let Object::Dict(entries) = state else {
        return Err(load_error(path, "saved object is not a state dict"));
    };

    let mut tensors = HashMap::with_capacity(entries.len());
    for (name, value) in entries {
        let Ok(name) = name.unicode() else { continue };
        let Some(tensor) = tensor_ref(value) else {
            debug!("Skipping non-tensor entry {}", name);
            continue;
        };
        let Some(storage) = storages.get(&tensor.storage) else {
            debug!("Skipping {}: unsupported storage type", name);
            continue;
        };
        let numel: usize = tensor.size.iter().product();
        if !is_row_major(&tensor.size, &tensor.stride) {
            return Err(load_error(path, format!("{} is not contiguous", name)));
        }
        if tensor.offset + numel > storage.dim(0)? {
            return Err(load_error(path, format!("{} overruns its storage", name)));
        }
        let value = storage.narrow(0, tensor.offset, numel)?.reshape(tensor.size.as_slice())?;
        tensors.insert(name, value);
    }
    Ok(tensors)
}
