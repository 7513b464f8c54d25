//! Wavefront OBJ reader: positions, normals, texcoords, polygon faces.
//! Corners missing a `vn` get area-weighted smooth normals.

use std::collections::HashMap;
use std::io::{self, BufRead};
use std::str::SplitWhitespace;

use anyhow::{Context, Result, anyhow, bail, ensure};

use corelib::Vec3;

use crate::mesh::{MeshData, MeshVertex};

/// Parsed OBJ: the first `o` name (if any) and the merged triangle mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjMesh {
    pub name: Option<String>,
    pub mesh: MeshData,
}

pub fn load_obj_from_reader<R: BufRead>(reader: R) -> Result<ObjMesh> {
    let mut parser = ObjParser::default();
    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.with_context(|| format!("Failed to read line {line_no}"))?;
        parser
            .line(&line)
            .with_context(|| format!("OBJ line {line_no}: '{}'", line.trim()))?;
    }
    parser.finish()
}

/// Parse OBJ text fetched as raw bytes.
pub fn load_obj_from_bytes(bytes: &[u8]) -> Result<ObjMesh> {
    let text = std::str::from_utf8(bytes).context("OBJ is not valid UTF-8")?;
    load_obj_from_str(text)
}

pub fn load_obj_from_str(contents: &str) -> Result<ObjMesh> {
    load_obj_from_reader(io::Cursor::new(contents))
}

/// One face corner: position, texcoord and normal slots (0-based).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
struct Corner {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

#[derive(Default)]
struct ObjParser {
    name: Option<String>,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    corners: HashMap<Corner, u32>,
    vertices: Vec<MeshVertex>,
    /// Vertices whose normal is accumulated from faces.
    smooth: Vec<bool>,
    indices: Vec<u32>,
}

impl ObjParser {
    fn line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("v") => self.positions.push(floats(&mut parts, "position")?),
            Some("vn") => self.normals.push(floats(&mut parts, "normal")?),
            Some("vt") => self.uvs.push(floats(&mut parts, "texcoord")?),
            Some("f") => self.face(parts)?,
            Some("o") if self.name.is_none() => {
                let name = parts.collect::<Vec<_>>().join(" ");
                self.name = (!name.is_empty()).then_some(name);
            }
            // g/s/usemtl/mtllib carry nothing we render
            _ => {}
        }
        Ok(())
    }

    fn face(&mut self, parts: SplitWhitespace<'_>) -> Result<()> {
        let polygon = parts
            .map(|token| self.corner(token))
            .collect::<Result<Vec<u32>>>()?;
        if polygon.len() < 3 {
            return Ok(());
        }
        for i in 1..polygon.len() - 1 {
            self.indices
                .extend_from_slice(&[polygon[0], polygon[i], polygon[i + 1]]);
        }
        Ok(())
    }

    /// Dedupe `v/vt/vn` triples into mesh vertices.
    fn corner(&mut self, token: &str) -> Result<u32> {
        let mut fields = token.split('/');
        let position = match fields.next() {
            Some(p) if !p.is_empty() => resolve(p, self.positions.len())?,
            _ => bail!("face corner '{token}' has no position"),
        };
        let mut optional = |len: usize| match fields.next() {
            Some(f) if !f.is_empty() => resolve(f, len).map(Some),
            _ => Ok(None),
        };
        let uv = optional(self.uvs.len())?;
        let normal = optional(self.normals.len())?;
        let key = Corner {
            position,
            uv,
            normal,
        };

        if let Some(&index) = self.corners.get(&key) {
            return Ok(index);
        }
        let index = u32::try_from(self.vertices.len())
            .map_err(|_| anyhow!("more than {} vertices", u32::MAX))?;
        self.vertices.push(MeshVertex::new(
            self.positions[position],
            normal.map_or([0.0; 3], |n| self.normals[n]),
            uv.map_or([0.0; 2], |t| self.uvs[t]),
        ));
        self.smooth.push(normal.is_none());
        self.corners.insert(key, index);
        Ok(index)
    }

    fn finish(mut self) -> Result<ObjMesh> {
        ensure!(!self.indices.is_empty(), "OBJ contained no triangles");
        self.smooth_normals();
        log::trace!(
            "OBJ parsed: {} vertices, {} triangles",
            self.vertices.len(),
            self.indices.len() / 3
        );
        Ok(ObjMesh {
            name: self.name,
            mesh: MeshData::new(self.vertices, self.indices),
        })
    }

    fn smooth_normals(&mut self) {
        if !self.smooth.contains(&true) {
            return;
        }
        let pos = |v: &MeshVertex| Vec3::from_array(v.position);
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| i as usize);
            // Unnormalized cross product weights by triangle area.
            let n = (pos(&self.vertices[b]) - pos(&self.vertices[a]))
                .cross(pos(&self.vertices[c]) - pos(&self.vertices[a]));
            for i in [a, b, c] {
                if self.smooth[i] {
                    let acc = Vec3::from_array(self.vertices[i].normal) + n;
                    self.vertices[i].normal = acc.to_array();
                }
            }
        }
        for (v, _) in self.vertices.iter_mut().zip(&self.smooth).filter(|(_, s)| **s) {
            v.normal = Vec3::from_array(v.normal)
                .try_normalize()
                .unwrap_or(Vec3::Z)
                .to_array();
        }
    }
}

fn floats<const N: usize>(parts: &mut SplitWhitespace<'_>, what: &str) -> Result<[f32; N]> {
    let mut out = [0.0; N];
    for (i, slot) in out.iter_mut().enumerate() {
        let token = parts
            .next()
            .ok_or_else(|| anyhow!("{} needs {} components, got {}", what, N, i))?;
        *slot = token
            .parse()
            .with_context(|| format!("bad {what} component '{token}'"))?;
    }
    Ok(out)
}

/// 1-based, or negative relative to the elements read so far.
fn resolve(token: &str, len: usize) -> Result<usize> {
    let raw: i64 = token
        .parse()
        .with_context(|| format!("invalid index '{token}'"))?;
    let index = match raw {
        0 => bail!("OBJ indices are 1-based; found 0"),
        r if r > 0 => r - 1,
        r => len as i64 + r,
    };
    if index < 0 || index as usize >= len {
        bail!("index {raw} out of range ({len} defined)");
    }
    Ok(index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_triangle() {
        let src = r#"
            v 0.0 0.0 0.0
            v 1.0 0.0 0.0
            v 0.0 1.0 0.0
            vn 0.0 0.0 1.0
            vt 0.0 0.0
            vt 1.0 0.0
            vt 0.0 1.0
            f 1/1/1 2/2/1 3/3/1
        "#;
        let obj = load_obj_from_str(src).expect("parse triangle");
        assert_eq!(obj.mesh.vertices.len(), 3);
        assert_eq!(obj.mesh.indices.len(), 3);
        assert!(obj.mesh.is_valid());
        assert_eq!(obj.name, None);
        assert_eq!(obj.mesh.vertices[1].uv, [1.0, 0.0]);
    }

    #[test]
    fn quad_is_fan_triangulated_and_named() {
        let src = "o Hero Plane\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let obj = load_obj_from_str(src).unwrap();
        assert_eq!(obj.name.as_deref(), Some("Hero Plane"));
        assert_eq!(obj.mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn shared_corners_are_deduplicated() {
        let src = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3\nf 1 3 4\n";
        let obj = load_obj_from_str(src).unwrap();
        assert_eq!(obj.mesh.vertices.len(), 4);
        assert_eq!(obj.mesh.indices.len(), 6);
    }

    #[test]
    fn missing_normals_are_generated() {
        let obj = load_obj_from_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        for v in &obj.mesh.vertices {
            assert!((v.normal[2] - 1.0).abs() < 1e-6, "{:?}", v.normal);
        }
    }

    #[test]
    fn negative_indices_are_relative() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let obj = load_obj_from_str(src).unwrap();
        assert_eq!(obj.mesh.vertices[2].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn bad_input_fails_with_line_context() {
        let err = load_obj_from_str("v 0 0 0\nf 0 0 0\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
        assert!(load_obj_from_str("v 0 0\n").is_err());
        assert!(load_obj_from_str("# nothing here\n").is_err());
        assert!(load_obj_from_bytes(&[0xff, 0xfe]).is_err());
    }
}
