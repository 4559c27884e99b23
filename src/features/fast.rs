//! FAST-9 コーナー検出

use image::GrayImage;

/// 半径3のBresenham円（16画素、時計回り）
const RING: [(i32, i32); 16] = [
    (0, -3), (1, -3), (2, -2), (3, -1),
    (3, 0), (3, 1), (2, 2), (1, 3),
    (0, 3), (-1, 3), (-2, 2), (-3, 1),
    (-3, 0), (-3, -1), (-2, -2), (-1, -3),
];

/// 連続して閾値を超える必要がある画素数
const ARC_LENGTH: u32 = 9;

/// 特徴点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keypoint {
    pub x: u32,
    pub y: u32,
    pub response: u32,
}

/// コーナーを検出し、応答の強い順に最大 `max_points` 件返す
///
/// 画像端から `margin` 画素以内は検出しない。
pub fn detect(image: &GrayImage, threshold: u8, margin: u32, max_points: usize) -> Vec<Keypoint> {
    let (width, height) = image.dimensions();
    let margin = margin.max(3);
    if width <= margin * 2 || height <= margin * 2 || max_points == 0 {
        return Vec::new();
    }

    let pixels = image.as_raw();
    let stride = width as usize;
    let mut responses = vec![0u32; pixels.len()];

    for y in margin..height - margin {
        for x in margin..width - margin {
            let idx = y as usize * stride + x as usize;
            responses[idx] = corner_response(pixels, stride, x, y, threshold);
        }
    }

    let mut keypoints = Vec::new();
    for y in margin..height - margin {
        for x in margin..width - margin {
            let idx = y as usize * stride + x as usize;
            let response = responses[idx];
            if response == 0 {
                continue;
            }
            if is_local_max(&responses, stride, idx, response) {
                keypoints.push(Keypoint { x, y, response });
            }
        }
    }

    keypoints.sort_by(|a, b| {
        b.response
            .cmp(&a.response)
            .then(a.y.cmp(&b.y))
            .then(a.x.cmp(&b.x))
    });
    keypoints.truncate(max_points);
    keypoints
}

/// 9画素以上の連続した明/暗の弧があれば応答値（差の総和）を返す。なければ0
fn corner_response(pixels: &[u8], stride: usize, x: u32, y: u32, threshold: u8) -> u32 {
    let center = i32::from(pixels[y as usize * stride + x as usize]);
    let t = i32::from(threshold);

    let mut brighter = 0u32;
    let mut darker = 0u32;
    let mut response = 0u32;

    for (bit, (dx, dy)) in RING.iter().enumerate() {
        let px = (x as i32 + dx) as usize;
        let py = (y as i32 + dy) as usize;
        let value = i32::from(pixels[py * stride + px]);
        let diff = value - center;
        if diff > t {
            brighter |= 1 << bit;
        } else if diff < -t {
            darker |= 1 << bit;
        }
        response += (diff.abs() - t).max(0) as u32;
    }

    if has_arc(brighter) || has_arc(darker) {
        response
    } else {
        0
    }
}

/// 16bitマスクに（環状で）ARC_LENGTH 個連続した1があるか
fn has_arc(mask: u32) -> bool {
    let mut run = mask | (mask << 16);
    for _ in 1..ARC_LENGTH {
        run &= run >> 1;
    }
    run != 0
}

/// 3x3近傍で最大か（同値は残す）
fn is_local_max(responses: &[u32], stride: usize, idx: usize, response: u32) -> bool {
    let neighbors = [
        idx - stride - 1, idx - stride, idx - stride + 1,
        idx - 1, idx + 1,
        idx + stride - 1, idx + stride, idx + stride + 1,
    ];
    neighbors.iter().all(|&n| responses[n] <= response)
}
