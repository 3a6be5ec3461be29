//! Differential fuzzer: drives random insert/delete instructions against a
//! real `Table` and a `HashMap` reference model, dumping the instruction
//! trace on the first divergence so it can be replayed as a regression
//! test. Adapted from the teacher's `btree-fuzzer`.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use rand::Rng;
use rowstore::disk::RandomAccessFile;
use rowstore::{FieldInfo, FieldType, RelationInfo, Table};

const ROUNDS: usize = 20_000;
const KEY_SPACE: i64 = 2_000;

#[derive(Debug, Clone)]
enum Instruction {
    Insert(i64, String),
    Delete(i64),
}

fn random_instruction(rng: &mut impl Rng, model: &HashMap<i64, String>) -> Instruction {
    if !model.is_empty() && rng.gen_bool(0.35) {
        let idx = rng.gen_range(0, model.len());
        let key = *model.keys().nth(idx).unwrap();
        Instruction::Delete(key)
    } else {
        let key = rng.gen_range(0, KEY_SPACE);
        let name: String = (0..12)
            .map(|_| rng.gen_range(b'a', b'z' + 1) as char)
            .collect();
        Instruction::Insert(key, name)
    }
}

fn relation(dir: &std::path::Path) -> RelationInfo {
    RelationInfo::new(
        "fuzz",
        vec![
            FieldInfo::new("id", 0, 8, FieldType::BigInt),
            FieldInfo::new("name", 1, -32, FieldType::VarChar),
        ],
        0,
        dir.join("fuzz.dat"),
        dir.join("fuzz.idx"),
    )
}

fn dump_trace(trace: &[Instruction], path: &str) {
    let mut f = File::create(path).expect("create trace file");
    for instr in trace {
        writeln!(f, "{:?}", instr).expect("write trace line");
    }
}

fn main() {
    env_logger::init();
    let dir = tempfile_dir();
    let relation = relation(&dir);
    Table::<RandomAccessFile>::create(&relation, 0).expect("create table");
    let mut table = Table::<RandomAccessFile>::open(relation.clone(), 0).expect("open table");

    let mut model: HashMap<i64, String> = HashMap::new();
    let mut trace = Vec::with_capacity(ROUNDS);
    let mut rng = rand::thread_rng();

    for round in 0..ROUNDS {
        let instr = random_instruction(&mut rng, &model);
        trace.push(instr.clone());

        match &instr {
            Instruction::Insert(key, name) => {
                let kb = key.to_be_bytes();
                let fields: [&[u8]; 2] = [&kb, name.as_bytes()];
                if table.insert(0, &fields).is_ok() {
                    model.insert(*key, name.clone());
                }
            }
            Instruction::Delete(key) => {
                let kb = key.to_be_bytes();
                if table.remove(&kb).is_ok() {
                    model.remove(key);
                }
            }
        }

        if round % 500 == 0 {
            if let Err(mismatch) = check(&mut table, &model) {
                eprintln!("divergence at round {round}: {mismatch}");
                dump_trace(&trace, "fuzz_failure_trace.txt");
                std::process::exit(1);
            }
        }
    }

    if let Err(mismatch) = check(&mut table, &model) {
        eprintln!("final divergence: {mismatch}");
        dump_trace(&trace, "fuzz_failure_trace.txt");
        std::process::exit(1);
    }

    println!("{ROUNDS} rounds completed, no divergence");
}

fn check(table: &mut Table<RandomAccessFile>, model: &HashMap<i64, String>) -> Result<(), String> {
    let mut seen = Vec::new();
    for row in table.scan().map_err(|e| e.to_string())? {
        let (_, fields) = row.map_err(|e| e.to_string())?;
        let key = i64::from_be_bytes(fields[0].clone().try_into().unwrap());
        let name = String::from_utf8(fields[1].clone()).unwrap();
        seen.push((key, name));
    }
    let mut expected: Vec<(i64, String)> =
        model.iter().map(|(k, v)| (*k, v.clone())).collect();
    expected.sort_by_key(|(k, _)| *k);
    if seen != expected {
        return Err(format!(
            "scan mismatch: {} rows seen, {} expected",
            seen.len(),
            expected.len()
        ));
    }
    Ok(())
}

fn tempfile_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("rowstore-fuzz-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create fuzzer scratch dir");
    dir
}
