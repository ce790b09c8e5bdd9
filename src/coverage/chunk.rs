//! Splitting a level's SAAs into chunks for distributed model acquisition.
//!
//! Each chunk receives roughly the same number of SAAs marked for fitting.
//! SAAs not marked for fitting travel with whichever chunk is open when they
//! are reached, so every SAA lands in exactly one chunk and order is kept.

use crate::coverage::set::CoverageSet;
use crate::domain::SaaKey;
use crate::error::AppError;

pub fn chunk_level(set: &CoverageSet, level: usize, n_chunks: usize) -> Result<Vec<Vec<SaaKey>>, AppError> {
    if n_chunks == 0 {
        return Err(AppError::config("Number of chunks must be > 0."));
    }
    if level >= set.levels().len() {
        return Err(AppError::config(format!(
            "Cannot chunk level {level}: coverage has {} levels.",
            set.levels().len()
        )));
    }

    let saas = set.level_saas(level);
    let mut remaining_fit = saas.iter().filter(|s| s.to_be_fit).count();

    let mut chunks = Vec::with_capacity(n_chunks);
    let mut current = Vec::new();
    let mut fit_in_current = 0usize;
    // Target is recomputed per chunk so leftovers spread evenly.
    let mut target = remaining_fit.div_ceil(n_chunks).max(1);
    for saa in saas {
        current.push(saa.key);
        if saa.to_be_fit {
            fit_in_current += 1;
        }
        if fit_in_current == target && chunks.len() + 1 < n_chunks {
            chunks.push(std::mem::take(&mut current));
            remaining_fit -= fit_in_current;
            fit_in_current = 0;
            target = remaining_fit.div_ceil(n_chunks - chunks.len()).max(1);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::set::CoverageConfig;
    use crate::cube::Cube;
    use crate::domain::MapShape;
    use crate::geometry::CoverageEntry;

    #[test]
    fn chunks_balance_fittable_saas() {
        let shape = MapShape::new(1, 10);
        let cube = Cube::new(vec![0.0, 1.0], shape, vec![1.0; 20], None).unwrap();
        let flags = [true, false, true, true, false, true, true, true, false, true];
        let config = CoverageConfig {
            map_shape: shape,
            x_offset: 0,
            y_offset: 0,
            moment_mask: None,
            widths: vec![1.0],
            patterns: vec![flags
                .iter()
                .enumerate()
                .map(|(i, &f)| CoverageEntry::new(i as f64, 0.0, f))
                .collect()],
        };
        let set = CoverageSet::build(&cube, &config, 1).unwrap();

        let chunks = chunk_level(&set, 0, 3).unwrap();
        assert_eq!(chunks.len(), 3);
        let total: usize = chunks.iter().map(Vec::len).sum();
        assert_eq!(total, 10);
        for chunk in &chunks {
            let fit = chunk.iter().filter(|k| set.get(**k).unwrap().to_be_fit).count();
            assert!((2..=3).contains(&fit), "chunk has {fit} fittable SAAs");
        }
        // Order is preserved across chunk boundaries.
        let flat: Vec<usize> = chunks.iter().flatten().map(|k| k.tile).collect();
        assert_eq!(flat, (0..10).collect::<Vec<_>>());

        assert!(chunk_level(&set, 0, 0).is_err());
        assert!(chunk_level(&set, 1, 2).is_err());
    }
}
