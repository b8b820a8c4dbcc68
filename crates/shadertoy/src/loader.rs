//! Turns shader inputs into pass descriptors for the render graph.
//!
//! Three kinds of input are accepted: a single JSON bundle on disk (`.json` or
//! `.js`), a Shadertoy id fetched through [`ShadertoyClient`], or one or more
//! GLSL files that together form a single image pass. Bundle passes keep their
//! Shadertoy names; the `common` pass is prepended to every other pass.

use std::fs;
use std::path::{Path, PathBuf};

use rendergraph::{
    BufferSource, ChannelSource, FilterMode, OutputId, PassDescriptor, PixelData, SamplerOptions,
    WrapMode, CHANNEL_COUNT,
};

use crate::bundle::{Bundle, PassKind, RenderInput, RenderPass, SamplerSpec};
use crate::decode::{decode_image, media_format};
use crate::error::LoadError;
use crate::remote::ShadertoyClient;

/// Passes ready for [`rendergraph::RenderGraph::build`], plus a display name.
#[derive(Debug, Clone)]
pub struct LoadedShader {
    pub name: String,
    pub passes: Vec<PassDescriptor>,
}

impl LoadedShader {
    /// The descriptor that publishes no output.
    pub fn image_pass_mut(&mut self) -> Option<&mut PassDescriptor> {
        self.passes.iter_mut().find(|pass| pass.output.is_none())
    }
}

/// Whether `path` names a JSON bundle rather than GLSL source.
pub fn is_bundle_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("js"))
}

#[derive(Debug, Clone, Default)]
pub struct ShaderLoader {
    client: Option<ShadertoyClient>,
    keyboard_channel: Option<usize>,
}

impl ShaderLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Media that is not on disk is downloaded through `client`.
    pub fn with_client(mut self, client: ShadertoyClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Force channel `channel` of the image pass to the keyboard texture.
    pub fn with_keyboard_channel(mut self, channel: Option<usize>) -> Self {
        self.keyboard_channel = channel;
        self
    }

    /// Load command-line inputs: one bundle, or any number of GLSL files.
    pub fn load_paths(&self, paths: &[PathBuf]) -> Result<LoadedShader, LoadError> {
        match paths {
            [] => Err(LoadError::NoInputs),
            [single] if is_bundle_path(single) => self.load_bundle_file(single),
            _ => self.load_glsl_files(paths),
        }
    }

    pub fn load_bundle_file(&self, path: &Path) -> Result<LoadedShader, LoadError> {
        let text = read_text(path)?;
        let bundle = Bundle::parse(&text, &path.display().to_string())?;
        tracing::info!(path = %path.display(), "loaded bundle");
        self.load_bundle(&bundle, path.parent())
    }

    pub fn load_remote(&self, shader_id: &str) -> Result<LoadedShader, LoadError> {
        let client = self.client.as_ref().ok_or_else(|| LoadError::AssetUnavailable {
            src: format!("shader {shader_id}"),
        })?;
        let bundle = client.fetch_bundle(shader_id)?;
        self.load_bundle(&bundle, None)
    }

    /// Every file becomes one `#line` chunk of a single image pass.
    pub fn load_glsl_files(&self, paths: &[PathBuf]) -> Result<LoadedShader, LoadError> {
        if paths.is_empty() {
            return Err(LoadError::NoInputs);
        }
        let mut image = PassDescriptor::new("Image");
        for path in paths {
            image = image.chunk(read_text(path)?);
            tracing::debug!(path = %path.display(), "appended source file");
        }
        let name = paths
            .first()
            .and_then(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "shader".to_string());
        let mut loaded = LoadedShader {
            name,
            passes: vec![image],
        };
        self.apply_keyboard(&mut loaded);
        Ok(loaded)
    }

    /// Convert a parsed bundle. Relative media paths resolve against `base_dir`.
    pub fn load_bundle(&self, bundle: &Bundle, base_dir: Option<&Path>) -> Result<LoadedShader, LoadError> {
        let payload = &bundle.shader;
        if payload.render_passes.is_empty() {
            return Err(LoadError::NoPasses);
        }

        let mut common = String::new();
        for pass in &payload.render_passes {
            if pass.kind() == PassKind::Common {
                common.push_str(&pass.code);
                if !common.ends_with('\n') {
                    common.push('\n');
                }
            }
        }

        let mut passes = Vec::new();
        for (index, pass) in payload.render_passes.iter().enumerate() {
            let name = if pass.name.trim().is_empty() {
                format!("pass{index}")
            } else {
                pass.name.clone()
            };
            match pass.kind() {
                PassKind::Common => continue,
                PassKind::Sound => {
                    tracing::warn!(pass = %name, "ignoring sound pass");
                    continue;
                }
                PassKind::Cubemap | PassKind::Other => {
                    return Err(LoadError::UnsupportedPass {
                        pass: name,
                        kind: pass.pass_type.clone(),
                    });
                }
                PassKind::Image | PassKind::Buffer => {}
            }
            passes.push(self.convert_pass(pass, name, &common, base_dir)?);
        }

        let mut loaded = LoadedShader {
            name: payload.info.name.clone(),
            passes,
        };
        self.apply_keyboard(&mut loaded);
        tracing::info!(
            shader = %loaded.name,
            passes = loaded.passes.len(),
            "converted bundle"
        );
        Ok(loaded)
    }

    fn convert_pass(
        &self,
        pass: &RenderPass,
        name: String,
        common: &str,
        base_dir: Option<&Path>,
    ) -> Result<PassDescriptor, LoadError> {
        let mut descriptor = PassDescriptor::new(name.clone());
        if pass.kind() == PassKind::Buffer {
            let output = pass.outputs.first().ok_or_else(|| LoadError::MissingField {
                pass: name.clone(),
                ctype: "buffer".into(),
                field: "an output",
            })?;
            descriptor = descriptor.output(output.id.to_string());
        }
        if !common.is_empty() {
            descriptor = descriptor.chunk(common);
        }
        descriptor = descriptor.chunk(pass.code.as_str());

        for input in &pass.inputs {
            let channel = input.channel as usize;
            if channel >= CHANNEL_COUNT {
                return Err(LoadError::ChannelOutOfRange {
                    pass: name,
                    channel: input.channel,
                });
            }
            let sampler = sampler_options(input.sampler.as_ref(), &name);
            let source = self.channel_source(input, &name, sampler, base_dir)?;
            tracing::debug!(pass = %name, channel, ctype = %input.channel_type, "bound input");
            descriptor.set_channel(channel, source, sampler);
        }
        Ok(descriptor)
    }

    fn channel_source(
        &self,
        input: &RenderInput,
        pass: &str,
        sampler: SamplerOptions,
        base_dir: Option<&Path>,
    ) -> Result<ChannelSource, LoadError> {
        let ctype = input.channel_type.to_ascii_lowercase();
        match ctype.as_str() {
            "keyboard" => Ok(ChannelSource::Keyboard),
            "buffer" => {
                let id = input.id.as_ref().ok_or_else(|| LoadError::MissingField {
                    pass: pass.to_string(),
                    ctype: ctype.clone(),
                    field: "an id",
                })?;
                Ok(ChannelSource::Buffer(BufferSource::Unresolved(OutputId::new(
                    id.to_string(),
                ))))
            }
            "texture" => {
                let src = required_src(input, pass, &ctype)?;
                let pixels = self
                    .load_image(src, sampler.vflip, base_dir)
                    .map_err(|err| err.in_pass(pass))?;
                Ok(ChannelSource::Texture(pixels))
            }
            "cubemap" => {
                let src = required_src(input, pass, &ctype)?;
                let faces = self
                    .load_cube(src, sampler.vflip, base_dir)
                    .map_err(|err| err.in_pass(pass))?;
                Ok(ChannelSource::Cubemap(Box::new(faces)))
            }
            _ => Err(LoadError::UnsupportedInput {
                pass: pass.to_string(),
                ctype: input.channel_type.clone(),
            }),
        }
    }

    fn load_image(&self, src: &str, vflip: bool, base_dir: Option<&Path>) -> Result<PixelData, LoadError> {
        media_format(src)?;
        let bytes = self.read_media(src, base_dir)?;
        decode_image(&bytes, src, vflip)
    }

    /// Shadertoy stores face 0 at `src` and faces 1-5 at `name_N.ext`.
    fn load_cube(&self, src: &str, vflip: bool, base_dir: Option<&Path>) -> Result<[PixelData; 6], LoadError> {
        let mut faces = Vec::with_capacity(6);
        for face in 0..6 {
            faces.push(self.load_image(&cube_face_path(src, face), vflip, base_dir)?);
        }
        let first = (faces[0].width, faces[0].height);
        if faces.iter().any(|face| (face.width, face.height) != first) {
            return Err(LoadError::MismatchedCubeFaces { src: src.to_string() });
        }
        faces
            .try_into()
            .map_err(|_| LoadError::MismatchedCubeFaces { src: src.to_string() })
    }

    fn read_media(&self, src: &str, base_dir: Option<&Path>) -> Result<Vec<u8>, LoadError> {
        if let Some(path) = src.strip_prefix("file://") {
            return read_bytes(Path::new(path));
        }
        if let Some(dir) = base_dir {
            let local = dir.join(src.trim_start_matches('/'));
            if local.is_file() {
                return read_bytes(&local);
            }
        }
        match &self.client {
            Some(client) => client.fetch_asset(src),
            None => Err(LoadError::AssetUnavailable { src: src.to_string() }),
        }
    }

    fn apply_keyboard(&self, loaded: &mut LoadedShader) {
        let Some(channel) = self.keyboard_channel else {
            return;
        };
        match loaded.image_pass_mut() {
            Some(image) => {
                image.set_channel(channel, ChannelSource::Keyboard, SamplerOptions::nearest_clamp());
                tracing::debug!(pass = %image.name, channel, "keyboard channel forced");
            }
            None => tracing::warn!(channel, "no image pass to receive the keyboard channel"),
        }
    }
}

fn required_src<'a>(input: &'a RenderInput, pass: &str, ctype: &str) -> Result<&'a str, LoadError> {
    input.src.as_deref().ok_or_else(|| LoadError::MissingField {
        pass: pass.to_string(),
        ctype: ctype.to_string(),
        field: "src",
    })
}

fn sampler_options(spec: Option<&SamplerSpec>, pass: &str) -> SamplerOptions {
    let default = SamplerSpec::default();
    let spec = spec.unwrap_or(&default);
    let filter = match spec.filter.to_ascii_lowercase().as_str() {
        "nearest" => FilterMode::Nearest,
        "linear" => FilterMode::Linear,
        "mipmap" => FilterMode::Mipmap,
        other => {
            tracing::warn!(pass, filter = other, "unknown sampler filter; using linear");
            FilterMode::Linear
        }
    };
    let wrap = match spec.wrap.to_ascii_lowercase().as_str() {
        "clamp" => WrapMode::Clamp,
        "repeat" => WrapMode::Repeat,
        other => {
            tracing::warn!(pass, wrap = other, "unknown sampler wrap; using repeat");
            WrapMode::Repeat
        }
    };
    SamplerOptions {
        filter,
        wrap,
        vflip: spec.vflip,
    }
}

pub(crate) fn cube_face_path(src: &str, face: usize) -> String {
    if face == 0 {
        return src.to_string();
    }
    match src.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => format!("{stem}_{face}.{ext}"),
        _ => format!("{src}_{face}"),
    }
}

fn read_text(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, LoadError> {
    fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use rendergraph::ChannelKind;

    use super::*;

    fn write_png(path: &Path, width: u32, height: u32) {
        let image = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn bundle(passes: &str) -> Bundle {
        Bundle::parse(
            &format!(r#"{{"Shader":{{"info":{{"name":"demo"}},"renderpass":[{passes}]}}}}"#),
            "test",
        )
        .unwrap()
    }

    fn channel_kind(pass: &PassDescriptor, index: usize) -> Option<ChannelKind> {
        pass.channels
            .iter()
            .find(|(channel, _)| *channel == index)
            .map(|(_, channel)| channel.kind())
    }

    #[test]
    fn common_code_is_prepended_to_every_pass() {
        let bundle = bundle(
            r#"{"name":"Common","type":"common","code":"float helper() { return 1.0; }"},
               {"name":"Buf A","type":"buffer","code":"A","outputs":[{"id":257,"channel":0}]},
               {"name":"Image","type":"image","code":"I","outputs":[{"id":37,"channel":0}]}"#,
        );
        let loaded = ShaderLoader::new().load_bundle(&bundle, None).unwrap();
        assert_eq!(loaded.name, "demo");
        assert_eq!(loaded.passes.len(), 2);
        let buffer = &loaded.passes[0];
        assert_eq!(buffer.output, Some(OutputId::new("257")));
        assert_eq!(buffer.chunks, vec!["float helper() { return 1.0; }\n".to_string(), "A".to_string()]);
        let image = &loaded.passes[1];
        assert_eq!(image.output, None);
        assert_eq!(image.chunks.len(), 2);
    }

    #[test]
    fn buffer_inputs_stay_unresolved_by_id() {
        let bundle = bundle(
            r#"{"name":"Image","type":"image","code":"",
                "inputs":[{"id":"4dXGR8","channel":2,"ctype":"buffer",
                           "sampler":{"filter":"nearest","wrap":"clamp","vflip":"false"}}]}"#,
        );
        let loaded = ShaderLoader::new().load_bundle(&bundle, None).unwrap();
        let (index, channel) = &loaded.passes[0].channels[0];
        assert_eq!(*index, 2);
        assert_eq!(
            channel.source,
            ChannelSource::Buffer(BufferSource::Unresolved(OutputId::new("4dXGR8")))
        );
        assert_eq!(channel.sampler.filter, FilterMode::Nearest);
        assert_eq!(channel.sampler.wrap, WrapMode::Clamp);
        assert!(!channel.sampler.vflip);
    }

    #[test]
    fn sound_passes_are_skipped() {
        let bundle = bundle(
            r#"{"name":"Sound","type":"sound","code":"vec2 mainSound(float t) { return vec2(0.0); }"},
               {"name":"Image","type":"image","code":""}"#,
        );
        let loaded = ShaderLoader::new().load_bundle(&bundle, None).unwrap();
        assert_eq!(loaded.passes.len(), 1);
        assert_eq!(loaded.passes[0].name, "Image");
    }

    #[test]
    fn cubemap_passes_are_rejected() {
        let bundle = bundle(
            r#"{"name":"Cube A","type":"cubemap","code":""},
               {"name":"Image","type":"image","code":""}"#,
        );
        let err = ShaderLoader::new().load_bundle(&bundle, None).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedPass { kind, .. } if kind == "cubemap"));
    }

    #[test]
    fn media_inputs_are_configuration_errors() {
        for ctype in ["music", "musicstream", "mic", "video", "webcam"] {
            let bundle = bundle(&format!(
                r#"{{"name":"Image","type":"image","code":"","inputs":[{{"channel":0,"ctype":"{ctype}","src":"/media/a/x.mp3"}}]}}"#
            ));
            let err = ShaderLoader::new().load_bundle(&bundle, None).unwrap_err();
            assert!(matches!(err, LoadError::UnsupportedInput { .. }), "{ctype}");
        }
    }

    #[test]
    fn channel_beyond_three_is_rejected() {
        let bundle = bundle(
            r#"{"name":"Image","type":"image","code":"","inputs":[{"channel":4,"ctype":"keyboard"}]}"#,
        );
        let err = ShaderLoader::new().load_bundle(&bundle, None).unwrap_err();
        assert!(matches!(err, LoadError::ChannelOutOfRange { channel: 4, .. }));
    }

    #[test]
    fn textures_load_relative_to_the_bundle() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("media/a")).unwrap();
        write_png(&dir.path().join("media/a/tex.png"), 4, 2);
        let bundle = bundle(
            r#"{"name":"Image","type":"image","code":"",
                "inputs":[{"channel":1,"ctype":"texture","src":"/media/a/tex.png"}]}"#,
        );
        let loaded = ShaderLoader::new()
            .load_bundle(&bundle, Some(dir.path()))
            .unwrap();
        let (_, channel) = &loaded.passes[0].channels[0];
        match &channel.source {
            ChannelSource::Texture(pixels) => {
                assert_eq!((pixels.width, pixels.height, pixels.channels), (4, 2, 3));
                assert_eq!(&pixels.bytes[..3], &[10, 20, 30]);
            }
            other => panic!("expected texture, got {other:?}"),
        }
    }

    #[test]
    fn file_scheme_reads_the_named_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tex.png");
        write_png(&path, 1, 1);
        let bundle = bundle(&format!(
            r#"{{"name":"Image","type":"image","code":"","inputs":[{{"channel":0,"ctype":"texture","src":"file://{}"}}]}}"#,
            path.display()
        ));
        let loaded = ShaderLoader::new().load_bundle(&bundle, None).unwrap();
        assert_eq!(channel_kind(&loaded.passes[0], 0), Some(ChannelKind::Texture));
    }

    #[test]
    fn missing_media_without_client_is_unavailable() {
        let bundle = bundle(
            r#"{"name":"Image","type":"image","code":"","inputs":[{"channel":0,"ctype":"texture","src":"/media/a/gone.jpg"}]}"#,
        );
        let err = ShaderLoader::new().load_bundle(&bundle, None).unwrap_err();
        assert!(matches!(err, LoadError::AssetUnavailable { .. }));
    }

    #[test]
    fn unknown_extension_is_rejected_before_reading() {
        let bundle = bundle(
            r#"{"name":"Image","type":"image","code":"","inputs":[{"channel":0,"ctype":"texture","src":"/media/a/tex.webp"}]}"#,
        );
        let err = ShaderLoader::new().load_bundle(&bundle, None).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedMedia { .. }));
    }

    #[test]
    fn cubemaps_load_six_faces() {
        let dir = tempfile::tempdir().unwrap();
        for face in 0..6 {
            write_png(&dir.path().join(cube_face_path("cube.png", face)), 2, 2);
        }
        let bundle = bundle(
            r#"{"name":"Image","type":"image","code":"","inputs":[{"channel":3,"ctype":"cubemap","src":"cube.png"}]}"#,
        );
        let loaded = ShaderLoader::new()
            .load_bundle(&bundle, Some(dir.path()))
            .unwrap();
        assert_eq!(channel_kind(&loaded.passes[0], 3), Some(ChannelKind::Cubemap));
    }

    #[test]
    fn cube_face_names_follow_shadertoy() {
        assert_eq!(cube_face_path("/media/a/abc.png", 0), "/media/a/abc.png");
        assert_eq!(cube_face_path("/media/a/abc.png", 3), "/media/a/abc_3.png");
        assert_eq!(cube_face_path("/media/a.b/abc", 1), "/media/a.b/abc_1");
    }

    #[test]
    fn glsl_files_become_chunks_of_one_image_pass() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("util.glsl");
        let second = dir.path().join("main.glsl");
        fs::write(&first, "float k = 1.0;").unwrap();
        fs::write(&second, "void mainImage(out vec4 c, in vec2 f) { c = vec4(k); }").unwrap();
        let loaded = ShaderLoader::new()
            .load_paths(&[first, second])
            .unwrap();
        assert_eq!(loaded.name, "util");
        assert_eq!(loaded.passes.len(), 1);
        assert_eq!(loaded.passes[0].chunks.len(), 2);
        assert!(loaded.passes[0].output.is_none());
    }

    #[test]
    fn keyboard_override_replaces_the_image_channel() {
        let bundle = bundle(
            r#"{"name":"Buf A","type":"buffer","code":"","outputs":[{"id":1,"channel":0}]},
               {"name":"Image","type":"image","code":"","inputs":[{"id":1,"channel":1,"ctype":"buffer"}]}"#,
        );
        let loaded = ShaderLoader::new()
            .with_keyboard_channel(Some(1))
            .load_bundle(&bundle, None)
            .unwrap();
        let image = &loaded.passes[1];
        assert_eq!(image.channels.len(), 1);
        assert_eq!(channel_kind(image, 1), Some(ChannelKind::Keyboard));
        assert_eq!(channel_kind(&loaded.passes[0], 1), None);
    }

    #[test]
    fn bundle_extension_is_case_insensitive() {
        assert!(is_bundle_path(Path::new("shader.JSON")));
        assert!(is_bundle_path(Path::new("dump.js")));
        assert!(!is_bundle_path(Path::new("shader.glsl")));
    }

    #[test]
    fn no_inputs_is_an_error() {
        assert!(matches!(
            ShaderLoader::new().load_paths(&[]),
            Err(LoadError::NoInputs)
        ));
    }
}
