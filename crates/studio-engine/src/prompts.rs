pub const GENERATE_PREAMBLE: &str = "A high-resolution, full-color illustration in a clean \
animation style, featuring bold outlines and cel-shaded coloring, with a light comedic tone.";

/// Full prompt sent for a generation request.
pub fn generate_prompt(user_prompt: &str) -> String {
    format!("{GENERATE_PREAMBLE} The scene is: {}", user_prompt.trim())
}

/// Full prompt sent alongside an uploaded image.
pub fn remix_prompt(user_prompt: &str) -> String {
    format!(
        "Enhance this image to be high-resolution and ultra-detailed, strictly maintaining its \
original art style. Apply the following change: \"{}\". The final image must preserve the \
original's core composition and character likeness.",
        user_prompt.trim()
    )
}
