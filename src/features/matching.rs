//! 記述子の総当たり照合（ハミング距離）

use super::brief::{hamming, Descriptor};
use scene_sync_common::{KnnObservation, PairwiseObservation};

/// 相互最近傍の組だけを残す最良一致
///
/// クエリ側の最近傍と候補側の最近傍が一致した組の距離を返す。
/// 同距離は先に見つかった方を採る。
pub fn match_cross_checked(query: &[Descriptor], candidate: &[Descriptor]) -> Vec<PairwiseObservation> {
    if query.is_empty() || candidate.is_empty() {
        return Vec::new();
    }

    let forward: Vec<(usize, u32)> = query.iter().map(|q| nearest(q, candidate)).collect();
    let backward: Vec<usize> = candidate.iter().map(|c| nearest(c, query).0).collect();

    forward
        .iter()
        .enumerate()
        .filter(|(qi, (ci, _))| backward[*ci] == *qi)
        .map(|(_, &(_, distance))| PairwiseObservation {
            distance: distance as f32,
        })
        .collect()
}

/// クエリ記述子ごとに距離の小さい順で2件（候補が1件なら1件）
pub fn match_knn2(query: &[Descriptor], candidate: &[Descriptor]) -> Vec<KnnObservation> {
    if candidate.is_empty() {
        return Vec::new();
    }

    query
        .iter()
        .map(|q| {
            let mut best = u32::MAX;
            let mut second = u32::MAX;
            for c in candidate {
                let d = hamming(q, c);
                if d < best {
                    second = best;
                    best = d;
                } else if d < second {
                    second = d;
                }
            }
            let distances = if candidate.len() >= 2 {
                vec![best as f32, second as f32]
            } else {
                vec![best as f32]
            };
            KnnObservation { distances }
        })
        .collect()
}

fn nearest(target: &Descriptor, pool: &[Descriptor]) -> (usize, u32) {
    let mut best = (0, u32::MAX);
    for (i, d) in pool.iter().enumerate() {
        let distance = hamming(target, d);
        if distance < best.1 {
            best = (i, distance);
        }
    }
    best
}
