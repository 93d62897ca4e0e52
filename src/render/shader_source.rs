// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

// injected in front of every stage
pub const SHADER_PREFIX: &str = "#version 100
#ifdef GL_ES
precision mediump float;
#endif
";

pub const DEFAULT_VERTEX_SHADER: &str = r#"
            attribute vec2 position;
            attribute vec4 color;
            attribute vec2 texCoord;
            attribute float pointSize;

            varying vec4 fColor;
            varying vec2 fTexCoord;

            uniform float cameraDx;
            uniform float cameraDy;
            uniform float cameraZoom;
            uniform mat2 rotationMatrix;
            // size of the destination texture
            uniform vec2 destinationSize;

            void main() {
                mat2 cameraMatrix = rotationMatrix * cameraZoom;
                gl_PointSize = pointSize * cameraZoom;
                vec2 position2d = cameraMatrix * (2. * (position - vec2(cameraDx, cameraDy)) / destinationSize - 1.);
                gl_Position = vec4(position2d, 0.0, 1.0);
                fColor = color;
                fTexCoord = texCoord;
            }
        "#;

pub const DEFAULT_FRAGMENT_SHADER_COLOR: &str = r#"
            varying vec4 fColor;
            varying vec2 fTexCoord;

            void main() {
                gl_FragColor = fColor;
            }
        "#;

// white vertex colour keeps the texel, other colours tint it
pub const DEFAULT_FRAGMENT_SHADER_TEX: &str = r#"
            uniform sampler2D tex;

            varying vec4 fColor;
            varying vec2 fTexCoord;

            void main() {
                vec4 color;
                vec4 texval = texture2D(tex, fTexCoord);
                color.rgb = mix(texval.rgb, fColor.rgb, vec3(1.) - fColor.rgb);
                color.a = texval.a * fColor.a;
                gl_FragColor = color;
            }
        "#;
