//! Writes state dicts the way `torch.save` lays them out, in both the zip
//! format and the pre-1.6 pickle stream.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use candle_core::{DType, Tensor};

use toxgraph_model::checkpoint::{LEGACY_MAGIC, LEGACY_PROTOCOL_VERSION};

struct Stored {
    name: String,
    class: &'static str,
    dims: Vec<usize>,
    numel: usize,
    bytes: Vec<u8>,
}

fn stored(name: &str, tensor: &Tensor) -> Stored {
    let flat = tensor.flatten_all().unwrap();
    let (class, bytes) = match tensor.dtype() {
        DType::I64 => (
            "LongStorage",
            flat.to_vec1::<i64>().unwrap().iter().flat_map(|v| v.to_le_bytes()).collect(),
        ),
        _ => (
            "FloatStorage",
            flat.to_dtype(DType::F32)
                .unwrap()
                .to_vec1::<f32>()
                .unwrap()
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
        ),
    };
    Stored {
        name: name.to_string(),
        class,
        dims: tensor.dims().to_vec(),
        numel: tensor.elem_count(),
        bytes,
    }
}

fn sorted(params: &HashMap<String, Tensor>) -> Vec<Stored> {
    let mut names: Vec<&String> = params.keys().collect();
    names.sort();
    names.into_iter().map(|n| stored(n, &params[n])).collect()
}

/// Protocol 2 opcodes, just the ones `torch.save` emits for a state dict.
struct Pickle(Vec<u8>);

impl Pickle {
    fn new() -> Self {
        Pickle(vec![0x80, 0x02])
    }

    fn op(&mut self, code: u8) -> &mut Self {
        self.0.push(code);
        self
    }

    fn global(&mut self, module: &str, class: &str) -> &mut Self {
        self.0.push(b'c');
        self.0.extend_from_slice(format!("{module}\n{class}\n").as_bytes());
        self
    }

    fn unicode(&mut self, s: &str) -> &mut Self {
        self.0.push(b'X');
        self.0.extend_from_slice(&(s.len() as u32).to_le_bytes());
        self.0.extend_from_slice(s.as_bytes());
        self
    }

    fn int(&mut self, v: usize) -> &mut Self {
        self.0.push(b'J');
        self.0.extend_from_slice(&(v as i32).to_le_bytes());
        self
    }

    fn ordered_dict(&mut self) -> &mut Self {
        self.global("collections", "OrderedDict").op(b')').op(b'R')
    }

    fn finish(mut self) -> Vec<u8> {
        self.0.push(b'.');
        self.0
    }
}

fn row_major(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}

/// The saved object: an `OrderedDict` of tensors whose storages are named
/// "0", "1", ... in entry order, optionally nested under `key`.
fn state_dict_pickle(entries: &[Stored], key: Option<&str>) -> Vec<u8> {
    let mut p = Pickle::new();
    if let Some(key) = key {
        p.op(b'}').unicode(key);
    }
    p.ordered_dict().op(b'(');
    for (i, t) in entries.iter().enumerate() {
        p.unicode(&t.name).global("torch._utils", "_rebuild_tensor_v2").op(b'(');
        p.op(b'(')
            .unicode("storage")
            .global("torch", t.class)
            .unicode(&i.to_string())
            .unicode("cpu")
            .int(t.numel)
            .op(b'N')
            .op(b't')
            .op(b'Q');
        p.int(0);
        p.op(b'(');
        for &d in &t.dims {
            p.int(d);
        }
        p.op(b't').op(b'(');
        for s in row_major(&t.dims) {
            p.int(s);
        }
        p.op(b't').op(0x89).ordered_dict().op(b't').op(b'R');
    }
    p.op(b'u');
    if key.is_some() {
        p.op(b's');
    }
    p.finish()
}

/// PyTorch >= 1.6 layout: `archive/data.pkl` plus one entry per storage.
pub fn save_zip(params: &HashMap<String, Tensor>, key: Option<&str>, path: &Path) {
    let entries = sorted(params);
    let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());

    zip.start_file("archive/data.pkl", options).unwrap();
    zip.write_all(&state_dict_pickle(&entries, key)).unwrap();
    for (i, t) in entries.iter().enumerate() {
        zip.start_file(format!("archive/data/{i}"), options).unwrap();
        zip.write_all(&t.bytes).unwrap();
    }
    zip.start_file("archive/version", options).unwrap();
    zip.write_all(b"3\n").unwrap();
    zip.finish().unwrap();
}

/// Pre-1.6 layout: a run of pickles followed by the raw storages.
pub fn save_legacy(params: &HashMap<String, Tensor>, key: Option<&str>, path: &Path) {
    let entries = sorted(params);
    let mut out = LEGACY_MAGIC.to_vec();

    let mut protocol = Pickle::new();
    protocol.op(b'M');
    protocol.0.extend_from_slice(&(LEGACY_PROTOCOL_VERSION as u16).to_le_bytes());
    out.extend(protocol.finish());

    let mut sys_info = Pickle::new();
    sys_info
        .op(b'}')
        .op(b'(')
        .unicode("protocol_version")
        .int(LEGACY_PROTOCOL_VERSION as usize)
        .unicode("little_endian")
        .op(0x88)
        .op(b'u');
    out.extend(sys_info.finish());

    out.extend(state_dict_pickle(&entries, key));

    let mut keys = Pickle::new();
    keys.op(b']').op(b'(');
    for i in 0..entries.len() {
        keys.unicode(&i.to_string());
    }
    keys.op(b'e');
    out.extend(keys.finish());

    for t in &entries {
        out.extend_from_slice(&(t.numel as i64).to_le_bytes());
        out.extend_from_slice(&t.bytes);
    }
    std::fs::write(path, out).unwrap();
}
