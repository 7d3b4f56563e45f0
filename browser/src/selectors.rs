//! Selectors for the portal's login page and video player. These track the
//! portal's current markup and are the first place to look when a run stops
//! finding things.

/// Selector for the student id input on the login page
pub const USERNAME_INPUT: &str = r#"input[placeholder="请输入您的学号/工号"]"#;

/// Selector for the password input on the login page
pub const PASSWORD_INPUT: &str = r#"input[placeholder="请输入您的密码"]"#;

/// Selector for the captcha image, when the portal decides to show one
pub const CAPTCHA_IMAGE: &str = "img.login_piccheck_img";

/// Selector for the captcha text input
pub const CAPTCHA_INPUT: &str = r#"input[placeholder="验证码"]"#;

/// Selector for the login button
pub const LOGIN_BUTTON: &str = "button.login_btn";

/// Selector for the lesson video element
pub const VIDEO_ELEMENT: &str = "video#video";

/// Selector matching either the episode list or a bare player, whichever the
/// lesson page renders first
pub const LESSON_READY: &str = ".video_lists ul, video#video";
